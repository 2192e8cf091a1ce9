//! FTS5 query sanitization
//!
//! The raw user query is untrusted with respect to FTS operators.
//! Sanitization lowercases, strips operator tokens, drops short words and
//! stop words, quotes what remains, and OR-joins the terms so that BM25
//! ranks on signal rather than on punctuation accidents.

/// Stop words excluded from FTS queries and from title-resolution tokens
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "that", "this", "from", "have", "has",
    "had", "but", "not", "you", "all", "can", "will", "one", "our", "out", "use", "uses", "used",
    "using", "how", "what", "when", "where", "which", "why", "who", "does", "into", "onto", "its",
    "their", "there", "then", "than", "some", "such", "only", "also", "any", "each", "may",
    "should", "would", "could", "about", "these", "those", "they", "them", "been", "being",
];

/// FTS5 operator tokens removed from queries (matched case-insensitively)
const FTS_OPERATORS: &[&str] = &["and", "or", "not", "near"];

/// Sanitize a raw query for FTS5 MATCH.
///
/// Returns an empty string when nothing searchable remains, in which case
/// the caller skips the FTS stage entirely. Idempotent:
/// `sanitize(sanitize(q)) == sanitize(q)`.
pub fn sanitize_fts5_query(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    // Punctuation (including quotes from a previous pass) becomes whitespace,
    // which both defuses FTS syntax and makes the function idempotent.
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let terms: Vec<String> = cleaned
        .split_whitespace()
        .filter(|word| word.len() > 2)
        .filter(|word| !FTS_OPERATORS.contains(word))
        .filter(|word| !STOP_WORDS.contains(word))
        .map(|word| format!("\"{word}\""))
        .collect();

    terms.join(" OR ")
}

/// Normalize a native BM25 rank (negative, more negative = better) into
/// a [0, 1] score: `clamp(1 / (1 - rank), 0, 1)`.
pub fn bm25_rank_to_score(rank: f64) -> f32 {
    let score = 1.0 / (1.0 - rank);
    score.clamp(0.0, 1.0) as f32
}

// ============================================================================
// TESTS
// ============================================================================
