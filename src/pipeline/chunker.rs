//! 歌詞テキストの正規化とチャンク分割。
//!
//! 生の歌詞をクリーニングし、スタンザ（空行区切り）を単位として
//! 行数・文字数の上限に収まるチャンクへまとめる。

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

const DECORATIVE_GLYPHS: [char; 11] = ['♪', '♫', '★', '☆', '※', '•', '◦', '◆', '◇', '▶', '▷'];

static SPACE_BEFORE_HYPHEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\S\n]+-").expect("compile hyphen pattern"));
static DISALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\p{Latin}\p{M}\p{N}\s.,'?!():;]").expect("compile allow-list pattern")
});
static HORIZONTAL_WS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\S\n]+").expect("compile whitespace pattern"));
static SPACE_AROUND_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" *\n *").expect("compile newline pattern"));
static BLANK_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("compile blank-run pattern"));

const STANZA_SEPARATOR: &str = "\n\n";

/// チャンク分割の閾値。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Below this many lines (and `single_max_tokens`) the whole text is one chunk.
    pub single_max_lines: usize,
    pub single_max_tokens: usize,
    pub max_lines: usize,
    pub max_chars: usize,
    /// Cleaned text at or below this many characters is rejected.
    pub min_chars: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            single_max_lines: 45,
            single_max_tokens: 600,
            max_lines: 60,
            max_chars: 3600,
            min_chars: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LyricChunker {
    limits: ChunkLimits,
}

impl LyricChunker {
    #[must_use]
    pub fn new(limits: ChunkLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> ChunkLimits {
        self.limits
    }

    /// Cleans `raw` and splits it into ordered chunks.
    ///
    /// Returns an empty list when the cleaned text is too short to be worth a
    /// backend call. Oversized input is never truncated.
    #[must_use]
    pub fn chunk(&self, raw: &str) -> Vec<String> {
        match clean(raw, self.limits.min_chars) {
            Some(cleaned) => self.chunk_cleaned(&cleaned),
            None => Vec::new(),
        }
    }

    fn chunk_cleaned(&self, cleaned: &str) -> Vec<String> {
        let limits = self.limits;
        let lines = count_lines(cleaned);
        let tokens = estimate_tokens(cleaned);
        if lines < limits.single_max_lines && tokens < limits.single_max_tokens {
            return vec![cleaned.to_string()];
        }

        let mut builder = ChunkBuilder::new(limits);
        for stanza in cleaned
            .split(STANZA_SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            if self.exceeds(stanza) {
                for piece in split_to_budget(stanza, limits) {
                    builder.push(&piece);
                }
            } else {
                builder.push(stanza);
            }
        }

        builder
            .finish()
            .into_iter()
            .flat_map(|chunk| {
                if self.exceeds(&chunk) {
                    split_to_budget(&chunk, limits)
                } else {
                    vec![chunk]
                }
            })
            .collect()
    }

    fn exceeds(&self, text: &str) -> bool {
        count_lines(text) > self.limits.max_lines
            || text.chars().count() > self.limits.max_chars
    }
}

/// Rolls stanzas into chunks, starting a new chunk whenever the next stanza
/// would push the current one over a ceiling.
struct ChunkBuilder {
    limits: ChunkLimits,
    buffer: String,
    lines: usize,
    chars: usize,
    chunks: Vec<String>,
}

impl ChunkBuilder {
    fn new(limits: ChunkLimits) -> Self {
        Self {
            limits,
            buffer: String::new(),
            lines: 0,
            chars: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str) {
        let piece_lines = count_lines(piece);
        let piece_chars = piece.chars().count();

        if !self.buffer.is_empty() {
            let would_exceed = self.lines + 1 + piece_lines > self.limits.max_lines
                || self.chars + STANZA_SEPARATOR.len() + piece_chars > self.limits.max_chars;
            if would_exceed {
                self.flush();
            } else {
                self.buffer.push_str(STANZA_SEPARATOR);
                self.lines += 1;
                self.chars += STANZA_SEPARATOR.len();
            }
        }

        self.buffer.push_str(piece);
        self.lines += piece_lines;
        self.chars += piece_chars;
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.chunks.push(std::mem::take(&mut self.buffer));
        }
        self.lines = 0;
        self.chars = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Hard split by line and character budget. Lines longer than the character
/// ceiling are broken at word boundaries.
fn split_to_budget(text: &str, limits: ChunkLimits) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buffer = String::new();
    let mut lines = 0;
    let mut chars = 0;

    for line in text.split('\n') {
        for segment in split_long_line(line, limits.max_chars) {
            let segment_chars = segment.chars().count();
            if !buffer.is_empty()
                && (lines + 1 > limits.max_lines || chars + 1 + segment_chars > limits.max_chars)
            {
                push_trimmed(&mut pieces, std::mem::take(&mut buffer));
                lines = 0;
                chars = 0;
            }
            if !buffer.is_empty() {
                buffer.push('\n');
                chars += 1;
            }
            buffer.push_str(&segment);
            lines += 1;
            chars += segment_chars;
        }
    }
    push_trimmed(&mut pieces, buffer);
    pieces
}

fn push_trimmed(pieces: &mut Vec<String>, piece: String) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

fn split_long_line(line: &str, max_chars: usize) -> Vec<String> {
    if line.chars().count() <= max_chars {
        return vec![line.to_string()];
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    for token in line.split_word_bounds() {
        let token_chars = token.chars().count();
        if current_chars + token_chars > max_chars && !current.is_empty() {
            segments.push(std::mem::take(&mut current).trim().to_string());
            current_chars = 0;
        }
        if token_chars > max_chars {
            let chars: Vec<char> = token.chars().collect();
            for window in chars.chunks(max_chars) {
                segments.push(window.iter().collect());
            }
            continue;
        }
        current.push_str(token);
        current_chars += token_chars;
    }
    if !current.trim().is_empty() {
        segments.push(current.trim().to_string());
    }
    segments.retain(|s| !s.is_empty());
    segments
}

/// Normalizes raw lyric text. Returns `None` when at most `min_chars`
/// characters survive cleaning.
#[must_use]
pub fn clean(raw: &str, min_chars: usize) -> Option<String> {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text: String = text.replace('\u{00A0}', " ").nfc().collect();
    let text: String = text
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2010}'..='\u{2015}' => '-',
            other => other,
        })
        .filter(|c| !DECORATIVE_GLYPHS.contains(c))
        .collect();
    let text = resolve_hyphens(&SPACE_BEFORE_HYPHEN.replace_all(&text, "-"));
    let text = DISALLOWED.replace_all(&text, "");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = SPACE_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = BLANK_RUNS.replace_all(&text, STANZA_SEPARATOR);
    let text = text.trim();

    if text.chars().count() <= min_chars {
        None
    } else {
        Some(text.to_string())
    }
}

/// letter-letter and digit-digit hyphens become a space, letter-digit pairs
/// are joined. Other hyphens are left for the allow-list to strip.
fn resolve_hyphens(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (idx, &c) in chars.iter().enumerate() {
        if c != '-' {
            out.push(c);
            continue;
        }
        let prev = idx.checked_sub(1).map(|i| chars[i]);
        let next = chars.get(idx + 1).copied();
        match (prev, next) {
            (Some(p), Some(n))
                if (p.is_alphabetic() && n.is_alphabetic())
                    || (p.is_numeric() && n.is_numeric()) =>
            {
                out.push(' ');
            }
            (Some(p), Some(n))
                if (p.is_alphabetic() && n.is_numeric())
                    || (p.is_numeric() && n.is_alphabetic()) => {}
            _ => out.push('-'),
        }
    }
    out
}

#[must_use]
pub fn count_lines(text: &str) -> usize {
    text.matches('\n').count() + 1
}

/// Rough token estimate: one token per four characters, at least one.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}
