//! CEFR レベル正規化。
//!
//! 出力は常に {A1, A2, B1, B2, C1, C2} か「なし」に閉じる。

use std::{collections::HashMap, fmt, str::FromStr};

use once_cell::sync::Lazy;

use super::items::MergedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl CefrLevel {
    pub const ALL: [CefrLevel; 6] = [
        CefrLevel::A1,
        CefrLevel::A2,
        CefrLevel::B1,
        CefrLevel::B2,
        CefrLevel::C1,
        CefrLevel::C2,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        }
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel;

impl FromStr for CefrLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CefrLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or(UnknownLevel)
    }
}

/// Keys are lower-case words joined with `-`; see [`synonym_key`].
static SYNONYMS: Lazy<HashMap<&'static str, CefrLevel>> = Lazy::new(|| {
    HashMap::from([
        ("beginner", CefrLevel::A1),
        ("elementary", CefrLevel::A2),
        ("pre-intermediate", CefrLevel::B1),
        ("intermediate", CefrLevel::B1),
        ("upper-intermediate", CefrLevel::B2),
        ("advanced", CefrLevel::C1),
        ("upper-advanced", CefrLevel::C1),
        ("proficient", CefrLevel::C2),
        ("native", CefrLevel::C2),
    ])
});

/// "Upper  Intermediate", "upper_intermediate" and "UPPER-intermediate" all map to
/// `upper-intermediate`.
fn synonym_key(raw: &str) -> String {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Maps a free-form level label to a CEFR code.
///
/// Tried in order: exact code after upper-casing, synonym table, code after
/// stripping every non-alphanumeric character. Anything else is unrecognized.
#[must_use]
pub fn normalize_level(raw: &str) -> Option<CefrLevel> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let upper = trimmed.to_uppercase();
    if let Ok(level) = upper.parse() {
        return Some(level);
    }

    if let Some(level) = SYNONYMS.get(synonym_key(trimmed).as_str()) {
        return Some(*level);
    }

    let compact: String = upper.chars().filter(char::is_ascii_alphanumeric).collect();
    compact.parse().ok()
}

/// Rewrites every level in place and returns how many fields changed.
///
/// Blank or unrecognized values are removed; recognized values are rewritten
/// to their canonical code. Both count as a change, as does any difference
/// between the stored text and the canonical code.
pub fn normalize_levels(result: &mut MergedResult) -> usize {
    let mut changed = 0;
    for slot in result.level_slots() {
        let Some(raw) = slot.as_deref() else {
            continue;
        };
        match normalize_level(raw) {
            Some(level) if level.as_str() == raw => {}
            Some(level) => {
                *slot = Some(level.as_str().to_string());
                changed += 1;
            }
            None => {
                *slot = None;
                changed += 1;
            }
        }
    }
    result.levels_normalized = changed;
    changed
}
