//! Lightweight query keywords, used only to reject semantically close but
//! lexically unrelated chunks.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Upper bound on the number of keywords taken from one query
pub const MAX_KEYWORDS: usize = 12;

/// Terms too generic in this corpus to count as evidence of relevance
pub const STOP_WORDS: &[&str] = &[
    "什么", "怎么", "如何", "可以", "是否", "老师", "同学", "上海", "大学", "校园",
];

fn cjk_pattern() -> &'static Regex {
    static CJK: OnceLock<Regex> = OnceLock::new();
    CJK.get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fff}]{2,4}").expect("CJK pattern is valid"))
}

fn alnum_pattern() -> &'static Regex {
    static ALNUM: OnceLock<Regex> = OnceLock::new();
    ALNUM.get_or_init(|| Regex::new(r"[A-Za-z0-9]{2,}").expect("alphanumeric pattern is valid"))
}

/// Extract filter keywords from a query.
///
/// CJK ideograph runs are taken greedily in pieces of two to four characters,
/// followed by ASCII alphanumeric runs of at least two characters from the
/// lowercased query. Duplicates and stop words are dropped, and the result is
/// ordered longest first (stable for equal lengths) and capped at
/// [`MAX_KEYWORDS`].
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    let candidates = cjk_pattern()
        .find_iter(query)
        .map(|m| m.as_str().to_string())
        .chain(
            alnum_pattern()
                .find_iter(&lowered)
                .map(|m| m.as_str().to_string()),
        );

    let mut seen = HashSet::new();
    let mut keywords: Vec<String> = candidates
        .filter(|k| !STOP_WORDS.contains(&k.as_str()))
        .filter(|k| seen.insert(k.clone()))
        .collect();

    keywords.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));
    keywords.truncate(MAX_KEYWORDS);
    keywords
}

/// Number of `keywords` occurring in `text` as literal substrings.
pub fn keyword_hits(text: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| !k.is_empty() && text.contains(k.as_str()))
        .count()
}
