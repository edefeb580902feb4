use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::CatalogEntry;

// Tried in order; the first pattern that matches decides the volume.
static VOLUME_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        Regex::new(r"第?([0-9]+)巻").expect("kan pattern"),
        Regex::new(r"[（(]([0-9]+)[）)]").expect("paren pattern"),
        Regex::new(r"\s*([0-9]+)\s*$").expect("trailing number pattern"),
        Regex::new(r"(?i)vol\.?\s*([0-9]+)").expect("vol pattern"),
    ]
});

static KAN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第?[0-9]+巻").expect("kan marker"));
static PAREN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[（(][0-9]+[）)]").expect("paren marker"));
static VOL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)vol\.?\s*[0-9]+").expect("vol marker"));
static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[0-9]+\s*$").expect("trailing number"));

/// Largest number accepted as a volume. Anything above it is treated like a
/// number that does not fit in `u32`, so gap reports stay bounded.
pub const MAX_VOLUME: u32 = 9999;

/// Volume number carried in a title such as `"鬼滅の刃 第5巻"`,
/// `"進撃の巨人（10）"`, `"ONE PIECE 1"` or `"Berserk Vol.3"`.
pub fn extract_volume_number(title: &str) -> Option<u32> {
    VOLUME_PATTERNS.iter().find_map(|re| {
        re.captures(title)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|v| *v <= MAX_VOLUME)
    })
}

/// Title with every volume marker removed.
pub fn extract_series_name(title: &str) -> String {
    let name = KAN_MARKER.replace_all(title, "");
    let name = PAREN_MARKER.replace_all(&name, "");
    let name = VOL_MARKER.replace_all(&name, "");
    let name = TRAILING_NUMBER.replace(&name, "");
    name.trim().to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeEntry {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub volume: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesGroup {
    pub series_name: String,
    pub entries: Vec<VolumeEntry>,
    pub total_volumes: u32,
    pub missing_volumes: Vec<u32>,
    pub has_all_volumes: bool,
}

/// Groups entries by their `series` field and reports gaps.
///
/// Entries without a series are left out. Within a group, entries without a
/// recognizable volume sort after the numbered ones in input order.
pub fn group_by_series(entries: &[CatalogEntry]) -> Vec<SeriesGroup> {
    let mut by_series: HashMap<&str, Vec<VolumeEntry>> = HashMap::new();
    for entry in entries {
        let Some(series) = entry.series.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        by_series.entry(series).or_default().push(VolumeEntry {
            volume: entry.volume(),
            entry: entry.clone(),
        });
    }

    let mut groups = by_series
        .into_iter()
        .map(|(series_name, mut entries)| {
            entries.sort_by(|a, b| compare_volumes(a.volume, b.volume));

            let present = entries
                .iter()
                .filter_map(|e| e.volume)
                .collect::<BTreeSet<_>>();
            let total_volumes = present.last().copied().unwrap_or(0);
            let missing_volumes = (1..=total_volumes)
                .filter(|v| !present.contains(v))
                .collect::<Vec<_>>();

            SeriesGroup {
                series_name: series_name.to_string(),
                has_all_volumes: missing_volumes.is_empty(),
                entries,
                total_volumes,
                missing_volumes,
            }
        })
        .collect::<Vec<_>>();

    groups.sort_by(|a, b| compare_series_names(&a.series_name, &b.series_name));
    groups
}

/// Short human-readable gap report for one group.
pub fn missing_volumes_summary(group: &SeriesGroup) -> String {
    match group.missing_volumes.len() {
        0 => "complete".to_string(),
        1..=5 => {
            let list = group
                .missing_volumes
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("missing: {list}")
        }
        n => format!("missing {n} volumes"),
    }
}

fn compare_volumes(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders series names the way a Japanese reader expects: katakana and
/// hiragana readings interleave, full-width Latin sorts with half-width.
pub fn compare_series_names(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

fn collation_key(s: &str) -> Vec<char> {
    s.chars()
        .map(|c| match c {
            // Katakana ァ..ヶ -> hiragana ぁ..ゖ
            '\u{30A1}'..='\u{30F6}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
            // Full-width ASCII variants -> ASCII
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
