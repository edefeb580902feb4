use std::collections::HashSet;

/// Pulls ISBN candidates out of pasted text or a CSV export.
///
/// Only the first comma-separated column of each line is considered. Hyphens
/// and spaces are removed, then the value must be ten characters of
/// `[0-9Xx]` or thirteen digits. Widths are kept as-is; canonicalization
/// happens later in [`crate::isbn::normalize`]. Duplicates are dropped,
/// keeping the first occurrence.
pub fn extract_isbns(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let first = line.split(',').next().unwrap_or_default().trim();
        let candidate: String = first
            .chars()
            .filter(|c| !matches!(c, '-' | ' ' | '\u{3000}'))
            .collect();

        if !is_candidate(&candidate) {
            tracing::debug!(line, "skipping line without isbn");
            continue;
        }
        if seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    }

    out
}

fn is_candidate(value: &str) -> bool {
    match value.len() {
        10 => value
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'X' | b'x')),
        13 => value.bytes().all(|b| b.is_ascii_digit()),
        _ => false,
    }
}
