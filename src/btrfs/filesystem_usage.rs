//! Parser for `btrfs filesystem usage --raw <path>`.

use super::ParseError;
use crate::registry::LabelKey;
use regex::Regex;
use std::sync::LazyLock;
use tracing::trace;

static USED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Used:[ \t]+(\d+)").expect("Failed to compile used regex")
});

static FREE_ESTIMATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*Free \(estimated\):[ \t]+(\d+)")
        .expect("Failed to compile free estimated regex")
});

/// Extracts the overall `Used` and `Free (estimated)` byte counts as
/// `(stat_type, path)` series. A field that is absent or does not fit in a
/// `u64` is skipped; if neither is present the output is rejected.
pub fn parse_filesystem_usage(
    raw: &str,
    path: &str,
) -> Result<Vec<(LabelKey<2>, f64)>, ParseError> {
    let mut samples = Vec::with_capacity(2);
    let fields: [(&str, &Regex); 2] = [
        ("used", &USED_RE),
        ("free_estimated", &FREE_ESTIMATED_RE),
    ];
    for (stat_type, re) in fields {
        let bytes = re
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        match bytes {
            // Byte counts stay exact up to 2^53, far beyond any real filesystem.
            Some(bytes) => samples.push((
                LabelKey::new([stat_type.to_string(), path.to_string()]),
                bytes as f64,
            )),
            None => trace!(stat_type, path, "Filesystem usage field not found"),
        }
    }

    if samples.is_empty() {
        return Err(ParseError::NoUsageFields);
    }
    Ok(samples)
}
