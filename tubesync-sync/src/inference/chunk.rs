//! Long-input windowing and context selection

use std::collections::HashSet;

/// Smallest window the splitter will use
pub const MIN_WINDOW_CHARS: usize = 1200;

/// Window cuts are searched for in the tail of the window starting here
const CUT_SEARCH_FROM_PERCENT: usize = 55;

const BLOCK_LINES: usize = 8;
const BLOCK_OVERLAP_LINES: usize = 2;

/// Windowing parameters for long transcripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Inputs longer than this many characters are split
    pub trigger_chars: usize,
    pub window_chars: usize,
    /// Characters shared by consecutive windows, at most a third of a window
    pub overlap_chars: usize,
    pub max_windows: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            trigger_chars: 12_000,
            window_chars: 7_000,
            overlap_chars: 400,
            max_windows: 4,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_chars < MIN_WINDOW_CHARS {
            return Err(format!("window_chars must be at least {MIN_WINDOW_CHARS}"));
        }
        if self.max_windows == 0 {
            return Err("max_windows must be greater than 0".into());
        }
        Ok(())
    }

    fn window(&self) -> usize {
        self.window_chars.max(MIN_WINDOW_CHARS)
    }

    fn overlap(&self) -> usize {
        self.overlap_chars.min(self.window() / 3)
    }
}

/// Returns `true` if `text` is long enough to be split
pub fn needs_chunking(text: &str, config: &ChunkConfig) -> bool {
    text.chars().count() > config.trigger_chars
}

/// Splits `text` into overlapping windows
///
/// Each cut is moved back to the last line break (or else space) found after
/// 55% of the window. At most `max_windows` windows are produced; text
/// beyond the last window is dropped. Blank windows are skipped.
pub fn split_windows(text: &str, config: &ChunkConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let window = config.window();
    let overlap = config.overlap();

    let mut windows = Vec::new();
    let mut start = 0;
    while start < len && windows.len() < config.max_windows {
        let mut end = (start + window).min(len);
        if end < len {
            let search_from = start + window * CUT_SEARCH_FROM_PERCENT / 100;
            let tail = &chars[search_from..end];
            let cut = tail
                .iter()
                .rposition(|c| *c == '\n')
                .or_else(|| tail.iter().rposition(|c| *c == ' '));
            if let Some(pos) = cut {
                end = search_from + pos + 1;
            }
        }

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            windows.push(piece.to_string());
        }

        if end >= len {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }

    windows
}

// =============================================================================
// Context selection
// =============================================================================

/// How transcript blocks are ranked against a question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    /// Plain question-term overlap
    Relevance,
    /// Favors blocks that look like evidence: numbers, quotes and dense
    /// coverage of the question terms
    Evidence,
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "what", "when", "where", "which", "who", "whom",
    "why", "how", "does", "did", "this", "that", "these", "those", "with", "from", "about",
    "into", "than", "then", "there", "their", "they", "them", "have", "has", "had", "will",
    "would", "could", "should", "can", "you", "your", "video", "said", "say", "says", "tell",
    "also", "just", "any", "all", "not", "but", "its", "our", "him", "her", "his", "she",
    "що", "як", "які", "яка", "який", "чому", "коли", "про", "для", "відео", "это", "как",
    "что", "видео",
];

/// Lowercased content words of a question
pub fn question_terms(question: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    question
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

fn score_block(block: &str, terms: &[String], scoring: Scoring) -> f64 {
    let lower = block.to_lowercase();
    let mut hits = 0.0;
    let mut covered = 0usize;
    for term in terms {
        let count = lower.matches(term.as_str()).count();
        if count > 0 {
            covered += 1;
            hits += count.min(3) as f64;
        }
    }

    match scoring {
        Scoring::Relevance => hits,
        Scoring::Evidence => {
            if covered == 0 {
                return 0.0;
            }
            let coverage = covered as f64 / terms.len().max(1) as f64;
            let numeric_lines = block
                .lines()
                .filter(|l| l.chars().any(|c| c.is_ascii_digit()))
                .count();
            let quoted_lines = block
                .lines()
                .filter(|l| l.contains(['"', '\u{201c}', '\u{00ab}']))
                .count();
            hits + 4.0 * coverage + 1.5 * numeric_lines as f64 + quoted_lines as f64
        }
    }
}

/// Picks the blocks of `text` that best match `question`
///
/// The text is cut into overlapping blocks of lines, ranked by `scoring`,
/// and the best blocks are returned in their original order within
/// `max_chars`. Falls back to the head of the text when nothing matches.
pub fn select_context(text: &str, question: &str, scoring: Scoring, max_chars: usize) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let terms = question_terms(question);

    let step = BLOCK_LINES - BLOCK_OVERLAP_LINES;
    let blocks: Vec<String> = (0..lines.len())
        .step_by(step)
        .map(|start| lines[start..(start + BLOCK_LINES).min(lines.len())].join("\n"))
        .collect();

    let mut ranked: Vec<(usize, f64)> = blocks
        .iter()
        .enumerate()
        .map(|(i, block)| (i, score_block(block, &terms, scoring)))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut picked = Vec::new();
    let mut used = 0;
    for (index, _) in ranked {
        let size = blocks[index].chars().count() + 2;
        if used + size > max_chars && !picked.is_empty() {
            continue;
        }
        used += size;
        picked.push(index);
    }

    if picked.is_empty() {
        return text.chars().take(max_chars).collect();
    }

    picked.sort_unstable();
    let context: String = picked
        .iter()
        .map(|i| blocks[*i].as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    context.chars().take(max_chars).collect()
}

const INSUFFICIENT_PHRASES: &[&str] = &[
    "insufficient",
    "not enough information",
    "not enough evidence",
    "not enough context",
    "does not contain",
    "doesn't contain",
    "does not mention",
    "doesn't mention",
    "not mentioned",
    "no information",
    "cannot determine",
    "can't determine",
    "unable to determine",
    "cannot be determined",
    "недостатньо",
    "не згадується",
    "немає інформації",
    "недостаточно",
    "не упоминается",
    "нет информации",
];

/// Returns `true` if an answer says the context did not support it
pub fn is_insufficient(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    INSUFFICIENT_PHRASES.iter().any(|p| lower.contains(p))
}
