//! Units formatting and conversion utilities
//!
//! Provides functions for human-readable formatting of counts, durations
//! and operation rates used by the progress reports.

use std::time::Duration;

/// Format a count with comma thousands separators
///
/// # Examples
/// ```
/// use mapload::util::units::format_count;
///
/// assert_eq!(format_count(5), "5");
/// assert_eq!(format_count(1234567), "1,234,567");
/// ```
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format duration into human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use mapload::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 3600 {
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if total_secs >= 60 {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        format!("{}m {}s", minutes, seconds)
    } else if total_secs > 0 {
        if millis > 0 {
            format!("{}.{:02}s", total_secs, millis / 10)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        format!("{}ms", millis)
    }
}

/// Calculate operations per second from a count and elapsed time
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use mapload::util::units::calculate_ops_per_sec;
///
/// let rate = calculate_ops_per_sec(1000, Duration::from_secs(2));
/// assert!((rate - 500.0).abs() < 0.01);
/// ```
pub fn calculate_ops_per_sec(operations: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }

    operations as f64 / duration.as_secs_f64()
}

/// Format an operation rate with appropriate units
///
/// # Examples
/// ```
/// use mapload::util::units::format_ops_rate;
///
/// assert_eq!(format_ops_rate(1500.0), "1.5K ops/s");
/// assert_eq!(format_ops_rate(2500000.0), "2.5M ops/s");
/// ```
pub fn format_ops_rate(ops: f64) -> String {
    if ops >= 1_000_000.0 {
        format!("{:.1}M ops/s", ops / 1_000_000.0)
    } else if ops >= 1_000.0 {
        format!("{:.1}K ops/s", ops / 1_000.0)
    } else {
        format!("{:.0} ops/s", ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_000_000), "1,000,000");
        assert_eq!(format_count(12_345_678), "12,345,678");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_calculate_ops_per_sec() {
        let rate = calculate_ops_per_sec(500, Duration::from_millis(500));
        assert!((rate - 1000.0).abs() < 0.01);

        assert_eq!(calculate_ops_per_sec(1000, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_format_ops_rate() {
        assert_eq!(format_ops_rate(500.0), "500 ops/s");
        assert_eq!(format_ops_rate(1500.0), "1.5K ops/s");
        assert_eq!(format_ops_rate(2500000.0), "2.5M ops/s");
    }
}
