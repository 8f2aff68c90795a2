//! Small text utilities shared by retrieval, citations and the graph.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "when", "where", "who", "why", "how", "can",
    "could", "should", "would", "will", "not", "our", "your", "you", "all", "any", "does", "did",
    "about", "into", "than", "then", "there", "these", "those", "also", "may", "must", "each",
    "other", "such", "more", "most", "some", "only", "over", "very", "just", "been", "being",
];

/// Ellipsis appended to truncated excerpts.
pub const ELLIPSIS: &str = "...";

fn stop_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

pub fn is_stop_word(word: &str) -> bool {
    stop_words().contains(word)
}

/// Lower-cased words with stop words, short words and numbers removed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 2)
        .filter(|w| !is_stop_word(w))
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// Lower-cased search terms with stop words and single characters removed.
///
/// Unlike [`tokenize`] this keeps two-character terms, so acronyms such as
/// "HR" or "Q3" still reach the index.
pub fn query_terms(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .filter(|w| !is_stop_word(w))
        .collect()
}

/// The `limit` most frequent tokens across `texts`.
///
/// Ties keep first-occurrence order.
pub fn keywords<'a>(texts: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0usize;

    for text in texts {
        for token in tokenize(text) {
            let entry = counts.entry(token).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked.into_iter().take(limit).map(|(word, _, _)| word).collect()
}

/// Whether `keyword` occurs in `text`, ignoring case.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    !keyword.is_empty() && text.to_lowercase().contains(&keyword.to_lowercase())
}

/// Truncate to at most `max_chars` characters, ending with an ellipsis
/// when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let cut: String = text.chars().take(keep).collect();
    format!("{}{}", cut.trim_end(), ELLIPSIS)
}

/// Build an FTS5 match expression from free text.
///
/// Every token is quoted so user input can never inject query syntax;
/// tokens are OR-ed so partial matches still rank.
pub fn fts_query(query: &str) -> Option<String> {
    let mut seen = HashSet::new();
    let terms: Vec<String> = query_terms(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_filters_noise() {
        let tokens = tokenize("What is the Travel policy for 2024, and who approves it?");
        assert_eq!(tokens, vec!["travel", "policy", "approves"]);
    }

    #[test]
    fn test_keywords_rank_by_frequency() {
        let texts = ["budget travel budget", "travel budget approval"];
        let top = keywords(texts.iter().copied(), 2);
        assert_eq!(top, vec!["budget", "travel"]);
    }

    #[test]
    fn test_keywords_ties_keep_first_occurrence() {
        let top = keywords(["zebra apple mango"].iter().copied(), 3);
        assert_eq!(top, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");

        let long = "a".repeat(250);
        let cut = truncate_chars(&long, 200);
        assert_eq!(cut.chars().count(), 200);
        assert!(cut.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let text = "é".repeat(50);
        let cut = truncate_chars(&text, 10);
        assert_eq!(cut.chars().count(), 10);
    }

    #[test]
    fn test_fts_query_quotes_tokens() {
        assert_eq!(
            fts_query("vacation policy \"NEAR\" vacation").as_deref(),
            Some("\"vacation\" OR \"policy\" OR \"near\"")
        );
        assert_eq!(fts_query("is it the?"), None);
    }

    #[test]
    fn test_fts_query_keeps_acronyms() {
        assert_eq!(fts_query("HR or IT?").as_deref(), Some("\"hr\""));
        assert_eq!(fts_query("Q3 UX review").as_deref(), Some("\"q3\" OR \"ux\" OR \"review\""));
        assert_eq!(fts_query("a b c"), None);
        assert!(tokenize("HR and Q3").is_empty());
    }

    #[test]
    fn test_contains_keyword() {
        assert!(contains_keyword("Annual Budget review", "budget"));
        assert!(!contains_keyword("Annual review", "budget"));
    }
}
