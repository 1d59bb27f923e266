//! Monitoring levels
//!
//! Each level owns a distinct bit so that combinations stay representable,
//! although every query issued today targets exactly one level.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity at which a metric query is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorLevel {
    Cluster,
    Node,
    Namespace,
    Application,
    Workload,
    Service,
    Pod,
    Container,
    PersistentVolumeClaim,
    Component,
    Ingress,
}

impl MonitorLevel {
    /// All levels in bit order
    pub const ALL: [MonitorLevel; 11] = [
        MonitorLevel::Cluster,
        MonitorLevel::Node,
        MonitorLevel::Namespace,
        MonitorLevel::Application,
        MonitorLevel::Workload,
        MonitorLevel::Service,
        MonitorLevel::Pod,
        MonitorLevel::Container,
        MonitorLevel::PersistentVolumeClaim,
        MonitorLevel::Component,
        MonitorLevel::Ingress,
    ];

    /// Unique bit value of this level
    pub const fn bits(self) -> u32 {
        1 << (self as u32)
    }

    /// Name used in metering configuration (`LevelNode`, `LevelPVC`, ...)
    pub fn name(self) -> &'static str {
        match self {
            MonitorLevel::Cluster => "LevelCluster",
            MonitorLevel::Node => "LevelNode",
            MonitorLevel::Namespace => "LevelNamespace",
            MonitorLevel::Application => "LevelApplication",
            MonitorLevel::Workload => "LevelWorkload",
            MonitorLevel::Service => "LevelService",
            MonitorLevel::Pod => "LevelPod",
            MonitorLevel::Container => "LevelContainer",
            MonitorLevel::PersistentVolumeClaim => "LevelPVC",
            MonitorLevel::Component => "LevelComponent",
            MonitorLevel::Ingress => "LevelIngress",
        }
    }

    /// Parse a metering level name. Unknown names yield `None`, never a default level.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.name() == name)
    }

    /// Label that identifies one entity at this level in backend results
    pub fn entity_label(self) -> &'static str {
        match self {
            MonitorLevel::Cluster => "cluster",
            MonitorLevel::Node => "node",
            MonitorLevel::Namespace => "namespace",
            MonitorLevel::Application => "application",
            MonitorLevel::Workload => "workload",
            MonitorLevel::Service => "service",
            MonitorLevel::Pod => "pod",
            MonitorLevel::Container => "container",
            MonitorLevel::PersistentVolumeClaim => "persistentvolumeclaim",
            MonitorLevel::Component => "component",
            MonitorLevel::Ingress => "ingress",
        }
    }
}

impl fmt::Display for MonitorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_label())
    }
}

/// Bitwise combination of levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LevelSet(u32);

impl LevelSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, level: MonitorLevel) -> Self {
        Self(self.0 | level.bits())
    }

    pub const fn contains(&self, level: MonitorLevel) -> bool {
        self.0 & level.bits() != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl From<MonitorLevel> for LevelSet {
    fn from(level: MonitorLevel) -> Self {
        Self(level.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_level_bits_are_unique() {
        let bits: HashSet<u32> = MonitorLevel::ALL.iter().map(|l| l.bits()).collect();
        assert_eq!(bits.len(), MonitorLevel::ALL.len());
        assert!(bits.iter().all(|b| b.is_power_of_two()));
    }

    #[test]
    fn test_level_bit_values_follow_declaration_order() {
        assert_eq!(MonitorLevel::Cluster.bits(), 1);
        assert_eq!(MonitorLevel::Node.bits(), 2);
        assert_eq!(MonitorLevel::Ingress.bits(), 1 << 10);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(MonitorLevel::from_name("LevelNode"), Some(MonitorLevel::Node));
        assert_eq!(
            MonitorLevel::from_name("LevelPVC"),
            Some(MonitorLevel::PersistentVolumeClaim)
        );
        assert_eq!(MonitorLevel::from_name("LevelUnknown"), None);
        assert_eq!(MonitorLevel::from_name(""), None);
    }

    #[test]
    fn test_level_set_composition() {
        let set = LevelSet::empty()
            .with(MonitorLevel::Node)
            .with(MonitorLevel::Pod);

        assert!(set.contains(MonitorLevel::Node));
        assert!(set.contains(MonitorLevel::Pod));
        assert!(!set.contains(MonitorLevel::Cluster));
        assert_eq!(set.bits(), MonitorLevel::Node.bits() | MonitorLevel::Pod.bits());
        assert_eq!(LevelSet::empty().bits(), 0);
    }
}
