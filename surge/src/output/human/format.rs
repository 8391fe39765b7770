use std::time::Duration;

pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_tags_inline(tags: &[(String, String)]) -> String {
    if tags.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<&(String, String)> = tags.iter().collect();
    sorted.sort();

    let inner = sorted
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");

    format!("{{{inner}}}")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

/// Reported duration values are milliseconds.
pub(crate) fn format_ms_opt(v: Option<f64>) -> String {
    match v {
        None => "-".to_string(),
        Some(ms) if ms >= 1000.0 => format!("{:.2}s", ms / 1000.0),
        Some(ms) if ms >= 1.0 => format!("{ms:.2}ms"),
        Some(ms) => format!("{:.0}µs", ms * 1000.0),
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    // Whole milliseconds keep humantime from printing nanosecond tails.
    let ms = Duration::from_millis(u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    humantime::format_duration(ms).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_uses_binary_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MiB");
    }

    #[test]
    fn format_tags_inline_sorts_keys() {
        let tags = vec![
            ("status".to_string(), "202".to_string()),
            ("error_kind".to_string(), "none".to_string()),
        ];
        assert_eq!(format_tags_inline(&tags), "{error_kind=none status=202}");
        assert_eq!(format_tags_inline(&[]), "");
    }

    #[test]
    fn format_ms_opt_picks_a_readable_unit() {
        assert_eq!(format_ms_opt(None), "-");
        assert_eq!(format_ms_opt(Some(0.25)), "250µs");
        assert_eq!(format_ms_opt(Some(12.5)), "12.50ms");
        assert_eq!(format_ms_opt(Some(1500.0)), "1.50s");
    }

    #[test]
    fn format_duration_drops_sub_millisecond_noise() {
        assert_eq!(format_duration(Duration::from_millis(300)), "300ms");
        assert_eq!(format_duration(Duration::from_micros(1_500_250)), "1s 500ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
    }
}
