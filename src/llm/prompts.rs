//! Prompt construction and response parsing shared by all providers.

use serde::Deserialize;

use super::{ConfirmedPerson, SummaryOptions, SummaryStrategy};

/// Longest document text sent in a single prompt, in characters.
const MAX_PROMPT_CHARS: usize = 12_000;

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_PROMPT_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn summary_prompt(text: &str, opts: &SummaryOptions) -> String {
    let title = opts.title.as_deref().unwrap_or("");
    let instruction = match opts.strategy {
        SummaryStrategy::General => {
            "Summarize the following wiki page in 3-5 sentences covering its key points. \
             Answer in the language of the page."
        }
        SummaryStrategy::Retrieval => {
            "Write a dense summary of the following wiki page for search indexing. \
             Keep every concrete fact: names, systems, identifiers, dates, and decisions. \
             Answer in the language of the page."
        }
    };
    format!(
        "{}\n\nPage title: {}\n\nPage content:\n{}\n\nSummary:",
        instruction,
        title,
        clip(text)
    )
}

pub fn keywords_prompt(text: &str, max_count: usize) -> String {
    format!(
        "Extract at most {} key terms from the following wiki page. \
         Do not include particles or numbering. Reply with the terms separated by commas only.\n\n\
         Page content:\n{}\n\nKeywords:",
        max_count,
        clip(text)
    )
}

pub fn person_prompt(text: &str, title: &str, candidates: &[String]) -> String {
    format!(
        r#"Identify which of the candidate names below are real people mentioned in this wiki page.
Only keep people named by their real name with concrete context. Merge aliases of the same person.

Page title: {title}

Page content:
{content}

Candidate names: {candidates}

Reply with JSON only:
{{
  "persons": [
    {{"name": "...", "department": "...", "role": "...", "email": "...", "mentioned_context": "...", "confidence": 0.9}}
  ]
}}"#,
        title = title,
        content = clip(text),
        candidates = candidates.join(", ")
    )
}

/// Trim a completion and drop a leading "Summary:" label.
pub fn clean_summary(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("Summary:")
        .or_else(|| trimmed.strip_prefix("요약:"))
        .unwrap_or(trimmed);
    stripped.trim().to_string()
}

/// Split a keyword completion into at most `max_count` distinct terms.
pub fn parse_keywords(raw: &str, max_count: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for piece in raw.split(|c: char| matches!(c, ',' | '\n' | ';' | '、')) {
        let term = clean_term(piece);
        if term.is_empty() {
            continue;
        }
        if seen.insert(term.to_lowercase()) {
            out.push(term);
        }
        if out.len() >= max_count {
            break;
        }
    }
    out
}

fn clean_term(piece: &str) -> String {
    let mut term = piece.trim();
    for label in ["Keywords:", "keywords:", "키워드:"] {
        if let Some(rest) = term.strip_prefix(label) {
            term = rest.trim();
        }
    }
    // "1." / "2)" numbering
    let digits = term.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &term[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            term = rest.trim();
        }
    }
    term = term.trim_start_matches(|c: char| matches!(c, '-' | '*' | '•' | '#') || c.is_whitespace());
    term.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”'))
        .trim()
        .to_string()
}

/// First JSON object in a completion, preferring a fenced ```json block.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let body = &raw[start + 7..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }

    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct PersonsResponse {
    #[serde(default)]
    persons: Vec<RawPerson>,
}

#[derive(Deserialize)]
struct RawPerson {
    #[serde(default)]
    name: String,
    department: Option<String>,
    role: Option<String>,
    email: Option<String>,
    #[serde(alias = "context")]
    mentioned_context: Option<String>,
    #[serde(default)]
    confidence: f64,
}

/// Parse the person-validation JSON; entries without a name are dropped.
pub fn parse_confirmed_persons(raw: &str) -> Result<Vec<ConfirmedPerson>, String> {
    let json = extract_json_object(raw).ok_or_else(|| "no JSON object in response".to_string())?;
    let parsed: PersonsResponse =
        serde_json::from_str(json).map_err(|e| format!("invalid person JSON: {}", e))?;

    Ok(parsed
        .persons
        .into_iter()
        .filter(|p| !p.name.trim().is_empty())
        .map(|p| ConfirmedPerson {
            name: p.name.trim().to_string(),
            confidence: p.confidence.clamp(0.0, 1.0),
            department: p.department.filter(|s| !s.is_empty()),
            role: p.role.filter(|s| !s.is_empty()),
            email: p.email.filter(|s| !s.is_empty()),
            context: p.mentioned_context.filter(|s| !s.is_empty()),
        })
        .collect())
}
