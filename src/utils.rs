//! # Utility Functions Module
//!
//! Human-readable byte sizes for previews, per-file reports and the final
//! run summary.

const SIZE_UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];

/// Formats a byte count with up to two decimals, e.g. `1536` -> `"1.5 KB"`.
///
/// # Example
/// ```rust
/// use image_batch_optimizer::utils::format_bytes;
///
/// assert_eq!(format_bytes(0), "0 Bytes");
/// assert_eq!(format_bytes(1024), "1 KB");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    format_bytes_with(bytes, 2)
}

/// Formats a byte count using powers of 1024 and at most `decimals` decimals.
///
/// Trailing zeros are dropped, so `1024` renders as `"1 KB"` rather than
/// `"1.00 KB"`. Values beyond the largest unit stay in TB.
pub fn format_bytes_with(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return format!("0 {}", SIZE_UNITS[0]);
    }

    let mut unit_index = 0;
    let mut divisor: u64 = 1;
    while unit_index < SIZE_UNITS.len() - 1 && bytes / divisor >= 1024 {
        divisor *= 1024;
        unit_index += 1;
    }

    let value = bytes as f64 / divisor as f64;
    let mut rendered = format!("{:.*}", decimals, value);
    if rendered.contains('.') {
        let trimmed = rendered.trim_end_matches('0').trim_end_matches('.').len();
        rendered.truncate(trimmed);
    }

    format!("{} {}", rendered, SIZE_UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_zero() {
        assert_eq!(format_bytes(0), "0 Bytes");
    }

    #[test]
    fn test_format_bytes_whole_units() {
        assert_eq!(format_bytes(1), "1 Bytes");
        assert_eq!(format_bytes(1023), "1023 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1024 * 1024), "1 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn test_format_bytes_fractions() {
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(2_621_440), "2.5 MB");
        assert_eq!(format_bytes(1234), "1.21 KB");
    }

    #[test]
    fn test_format_bytes_caps_at_terabytes() {
        let two_pb = 2 * 1024u64.pow(5);
        assert_eq!(format_bytes(two_pb), "2048 TB");
    }

    #[test]
    fn test_format_bytes_custom_decimals() {
        assert_eq!(format_bytes_with(1536, 0), "2 KB");
        assert_eq!(format_bytes_with(1234, 3), "1.205 KB");
        assert_eq!(format_bytes_with(10 * 1024, 0), "10 KB");
    }
}
