//! Candidate person names from raw text (regex-based).
//!
//! Over-generates on purpose; the provider chain confirms the real names.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::models::{Document, PersonEntity, PersonMention, RelationKind};

/// Words that match name patterns but are titles, teams, or document nouns.
const EXCLUDED_WORDS: &[&str] = &[
    "개발", "관리", "프로젝트", "문서", "페이지", "시스템", "회사", "부서", "팀장", "대리", "과장",
    "부장", "이사", "사장", "대표", "차장", "주임", "센터", "사업부", "본부", "그룹", "계획",
    "업무", "담당", "책임", "회의", "일정", "배포", "테스트", "서버", "참고", "요약", "공지",
];

/// Capitalized words that start two-word phrases but are not given names.
const EXCLUDED_LATIN: &[&str] = &[
    "The", "This", "That", "These", "Those", "Release", "Project", "Team", "Page", "Meeting",
    "Status", "Next", "Last", "New", "Open", "Action", "Items", "Table", "See", "Please",
];

fn korean_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // a whole 2-4 syllable word, optionally followed by an honorific
    RE.get_or_init(|| Regex::new(r"\b([가-힣]{2,4}?)(?:님|씨)?\b").expect("Invalid regex pattern"))
}

fn korean_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([가-힣]{2,4})@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("Invalid regex pattern")
    })
}

fn latin_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][a-z]+)[ \t]+([A-Z][a-z]+)\b").expect("Invalid regex pattern")
    })
}

/// Candidate names in order of first appearance, capped at `max_candidates`.
pub fn extract_name_candidates(content: &str, max_candidates: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<(usize, String)> = Vec::new();

    let mut push = |offset: usize, name: &str, seen: &mut HashSet<String>| {
        if seen.insert(name.to_string()) {
            candidates.push((offset, name.to_string()));
        }
    };

    for cap in korean_email().captures_iter(content) {
        if let Some(m) = cap.get(1) {
            if !EXCLUDED_WORDS.contains(&m.as_str()) {
                push(m.start(), m.as_str(), &mut seen);
            }
        }
    }

    for cap in korean_name().captures_iter(content) {
        if let Some(m) = cap.get(1) {
            if !EXCLUDED_WORDS.contains(&m.as_str()) {
                push(m.start(), m.as_str(), &mut seen);
            }
        }
    }

    for cap in latin_name().captures_iter(content) {
        let (Some(first), Some(last)) = (cap.get(1), cap.get(2)) else {
            continue;
        };
        if EXCLUDED_LATIN.contains(&first.as_str()) {
            continue;
        }
        let full = format!("{} {}", first.as_str(), last.as_str());
        push(first.start(), &full, &mut seen);
    }

    candidates.sort_by_key(|(offset, _)| *offset);
    candidates
        .into_iter()
        .take(max_candidates)
        .map(|(_, name)| name)
        .collect()
}

/// Creator and modifier relations taken from document metadata.
pub fn structural_mentions(doc: &Document) -> Vec<PersonMention> {
    let mut mentions = Vec::new();
    let creator = doc.created_by.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let modifier = doc.modified_by.as_deref().map(str::trim).filter(|s| !s.is_empty());

    if let Some(name) = creator {
        mentions.push(PersonMention::structural(name, RelationKind::Creator));
    }
    if let Some(name) = modifier {
        let same_as_creator = creator
            .map(|c| PersonEntity::normalize_name(c) == PersonEntity::normalize_name(name))
            .unwrap_or(false);
        if !same_as_creator {
            mentions.push(PersonMention::structural(name, RelationKind::Modifier));
        }
    }
    mentions
}

/// Whether a provider-returned name refers to one of the scanned candidates.
///
/// Matches on normalized names; a longer provider name that contains a
/// candidate (an alias merge such as "김철수 팀장") also counts.
pub fn matches_candidate(name: &str, candidates: &[String]) -> bool {
    let normalized = PersonEntity::normalize_name(name);
    if normalized.is_empty() {
        return false;
    }
    candidates.iter().any(|c| {
        let candidate = PersonEntity::normalize_name(c);
        !candidate.is_empty() && (candidate == normalized || normalized.contains(&candidate))
    })
}
