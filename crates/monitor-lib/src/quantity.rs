//! Kubernetes resource quantity parsing
//!
//! CPU quantities ("250m", "2", "1500000n") convert to millicores and memory
//! quantities ("512Mi", "8Gi", "1e9") convert to bytes.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to parse resource quantity: {0}")]
pub struct QuantityError(pub String);

const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1024.0 * 1024.0),
    ("Gi", 1024.0 * 1024.0 * 1024.0),
    ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

const DECIMAL_SUFFIXES: &[(&str, f64)] = &[
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("K", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity into its base unit (cores, bytes)
fn parse_base(quantity: &str) -> Result<f64, QuantityError> {
    let quantity = quantity.trim();
    let invalid = || QuantityError(quantity.to_string());

    let (number, multiplier) = BINARY_SUFFIXES
        .iter()
        .chain(DECIMAL_SUFFIXES)
        .find_map(|(suffix, mult)| quantity.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((quantity, 1.0));

    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value * multiplier)
}

/// Parse a CPU quantity to millicores
pub fn parse_cpu_millicores(quantity: &str) -> Result<u64, QuantityError> {
    Ok((parse_base(quantity)? * 1000.0).round() as u64)
}

/// Parse a memory quantity to bytes
pub fn parse_memory_bytes(quantity: &str) -> Result<u64, QuantityError> {
    Ok(parse_base(quantity)?.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_millicores() {
        assert_eq!(parse_cpu_millicores("100m"), Ok(100));
        assert_eq!(parse_cpu_millicores("1"), Ok(1000));
        assert_eq!(parse_cpu_millicores("0.5"), Ok(500));
        assert_eq!(parse_cpu_millicores("2.5"), Ok(2500));
        assert_eq!(parse_cpu_millicores("500000000n"), Ok(500));
        assert_eq!(parse_cpu_millicores("500000u"), Ok(500));
    }

    #[test]
    fn test_parse_memory_bytes() {
        assert_eq!(parse_memory_bytes("128Mi"), Ok(128 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("1Gi"), Ok(1024 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("256000Ki"), Ok(256_000 * 1024));
        assert_eq!(parse_memory_bytes("1G"), Ok(1_000_000_000));
        assert_eq!(parse_memory_bytes("1e9"), Ok(1_000_000_000));
        assert_eq!(parse_memory_bytes("4096"), Ok(4096));
    }

    #[test]
    fn test_parse_invalid_quantity() {
        assert!(parse_cpu_millicores("").is_err());
        assert!(parse_cpu_millicores("lots").is_err());
        assert!(parse_memory_bytes("-1Gi").is_err());
    }
}
