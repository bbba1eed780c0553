//! Helpers for the Prometheus text exposition format (version 0.0.4).
//!
//! Line layout and escaping come from `metrics_exporter_prometheus::formatting`,
//! so the stale-aware gauges render exactly like the recorder output they are
//! appended to.

use metrics_exporter_prometheus::formatting::{
    sanitize_label_key, sanitize_label_value, write_help_line, write_metric_line,
    write_type_line,
};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn write_header(out: &mut String, name: &str, help: &str, kind: &str) {
    write_help_line(out, name, help);
    write_type_line(out, name, kind);
}

pub fn write_sample(
    out: &mut String,
    name: &str,
    label_names: &[&str],
    label_values: &[String],
    value: f64,
) {
    let labels: Vec<String> = label_names
        .iter()
        .zip(label_values)
        .map(|(label, value)| {
            format!(
                "{}=\"{}\"",
                sanitize_label_key(label),
                sanitize_label_value(value)
            )
        })
        .collect();
    write_metric_line::<&str, String>(out, name, None, &labels, None, format_value(value));
}

/// Formats a sample value. Integral values print without a fractional part,
/// so byte counts come out exactly as the tool reported them.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_integers_are_rendered_exactly() {
        assert_eq!(format_value(3612965650432.0), "3612965650432");
        assert_eq!(format_value(9192925765632.0), "9192925765632");
        assert_eq!(format_value(0.0), "0");
    }

    #[test]
    fn special_values_use_prometheus_spelling() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn label_values_are_escaped() {
        let mut out = String::new();
        write_sample(
            &mut out,
            "m",
            &["path"],
            &["/mnt/\"odd\"\\dir\n".to_string()],
            1.0,
        );
        assert_eq!(out, "m{path=\"/mnt/\\\"odd\\\"\\\\dir\\n\"} 1\n");
    }

    #[test]
    fn help_text_escapes_newlines() {
        let mut out = String::new();
        write_header(&mut out, "m", "first\nsecond", "gauge");
        assert_eq!(out, "# HELP m first\\nsecond\n# TYPE m gauge\n");
    }

    #[test]
    fn trailing_backslash_in_label_value_is_escaped() {
        let mut out = String::new();
        write_sample(&mut out, "m", &["path"], &["C:\\".to_string()], 0.0);
        assert_eq!(out, "m{path=\"C:\\\\\"} 0\n");
    }

    #[test]
    fn sample_without_labels_has_no_braces() {
        let mut out = String::new();
        write_sample(&mut out, "m", &[], &[], 2.5);
        assert_eq!(out, "m 2.5\n");
    }
}
