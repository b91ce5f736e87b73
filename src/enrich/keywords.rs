//! Frequency-based keyword fallback used when providers cannot answer.

use std::collections::HashMap;

use crate::models::KeywordSet;

/// Summary stored when every provider failed.
pub const PLACEHOLDER_SUMMARY: &str = "[summary unavailable]";

/// Keyword marking documents with no usable body.
pub const NO_CONTENT_KEYWORD: &str = "no-content";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "will", "have",
    "has", "had", "not", "but", "you", "your", "our", "its", "can", "all", "any", "into", "about",
    "which", "when", "what", "who", "how", "also", "than", "then", "there", "their", "they",
    "them", "been", "being", "would", "should", "could", "may", "more", "most", "such", "only",
    "other", "some", "each", "page", "https", "http", "www", "com",
    "그리고", "하지만", "그러나", "그래서", "또는", "및", "등", "이번", "해당", "관련", "대한",
    "위한", "통해", "있는", "없는", "합니다", "입니다", "있습니다", "없습니다", "한다", "된다",
    "경우", "내용", "페이지", "문서",
];

/// Trailing particles stripped from Hangul tokens.
const PARTICLES: &[&str] = &[
    "에서", "으로", "에게", "까지", "부터", "은", "는", "이", "가", "을", "를", "의", "에", "로",
    "와", "과", "도", "만",
];

fn is_hangul(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

fn strip_particle(token: &str) -> &str {
    for particle in PARTICLES {
        if let Some(stem) = token.strip_suffix(particle) {
            if stem.chars().count() >= 2 {
                return stem;
            }
        }
    }
    token
}

/// Candidate term for one token, or `None` when it is too short or a stop-word.
fn usable_token(token: &str) -> Option<String> {
    if token.is_empty() || token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let term = if token.chars().any(is_hangul) {
        let stem = strip_particle(token);
        if stem.chars().count() < 2 {
            return None;
        }
        stem.to_string()
    } else {
        if token.chars().count() < 3 {
            return None;
        }
        token.to_lowercase()
    };
    if STOPWORDS.contains(&term.as_str()) {
        None
    } else {
        Some(term)
    }
}

/// Most frequent usable terms; ties keep first appearance.
pub fn heuristic_keywords(text: &str, max_count: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0;

    for token in text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_')) {
        let token = token.trim_matches(|c: char| c == '-' || c == '_');
        if let Some(term) = usable_token(token) {
            let entry = counts.entry(term).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(term, (count, first))| (term, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(max_count).map(|(t, _, _)| t).collect()
}

/// Normalize provider keywords into a set capped at `max_count`.
pub fn collect_keywords<S: AsRef<str>>(terms: &[S], max_count: usize) -> KeywordSet {
    let mut set = KeywordSet::new();
    for term in terms {
        if set.len() >= max_count {
            break;
        }
        set.insert(term.as_ref());
    }
    set
}

/// Fill `set` with heuristic terms until it holds `max_count` keywords.
pub fn top_up(set: &mut KeywordSet, text: &str, max_count: usize) {
    for term in heuristic_keywords(text, max_count) {
        if set.len() >= max_count {
            break;
        }
        set.insert(&term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_order_with_first_appearance_ties() {
        let text = "deploy rust service. rust deploy rust. tokio";
        assert_eq!(heuristic_keywords(text, 3), vec!["rust", "deploy", "service"]);
    }

    #[test]
    fn test_short_and_stop_words_dropped() {
        let text = "The API is up and it is OK for the team 2024";
        assert_eq!(heuristic_keywords(text, 10), vec!["api", "team"]);
    }

    #[test]
    fn test_hangul_particles_stripped() {
        let text = "배포를 준비합니다. 배포 일정은 다음 주 서버에서 진행";
        let kws = heuristic_keywords(text, 3);
        assert_eq!(kws[0], "배포");
        assert!(kws.contains(&"일정".to_string()));
        assert!(!kws.iter().any(|k| k == "주"));
    }

    #[test]
    fn test_collect_caps_after_normalization() {
        let set = collect_keywords(&["Rust", "rust ", "Tokio", "SQLite"], 2);
        assert_eq!(set.to_vec(), vec!["rust", "tokio"]);
    }

    #[test]
    fn test_top_up_respects_cap() {
        let mut set = collect_keywords(&["rust"], 15);
        top_up(&mut set, "tokio tokio sqlite rust", 3);
        assert_eq!(set.to_vec(), vec!["rust", "sqlite", "tokio"]);
    }
}
