//! Deterministic in-process provider for tests and dry runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ConfirmedPerson, ProviderError, SummaryOptions, TextGenerator};

type SummaryFn = Box<dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync>;
type KeywordFn = Box<dyn Fn(&str, usize) -> Result<Vec<String>, ProviderError> + Send + Sync>;

/// Provider whose answers are fixed closures.
///
/// Defaults: the summary is the first sentence of the text, keywords are the
/// distinct lowercase words of three or more letters in order of appearance,
/// and every candidate name is confirmed with confidence 0.9.
pub struct StubGenerator {
    name: String,
    summary: SummaryFn,
    keywords: KeywordFn,
    persons: Option<Result<Vec<ConfirmedPerson>, ProviderError>>,
    delay: Option<Duration>,
    summary_calls: AtomicUsize,
    keyword_calls: AtomicUsize,
    person_calls: AtomicUsize,
}

impl StubGenerator {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            summary: Box::new(|text| Ok(first_sentence(text))),
            keywords: Box::new(|text, max| Ok(distinct_words(text, max))),
            persons: None,
            delay: None,
            summary_calls: AtomicUsize::new(0),
            keyword_calls: AtomicUsize::new(0),
            person_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_summary(
        mut self,
        f: impl Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.summary = Box::new(f);
        self
    }

    pub fn failing_summary(self, retryable: bool) -> Self {
        let name = self.name.clone();
        self.with_summary(move |_| Err(stub_error(&name, "summary unavailable", retryable)))
    }

    pub fn with_keywords(
        mut self,
        f: impl Fn(&str, usize) -> Result<Vec<String>, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        self.keywords = Box::new(f);
        self
    }

    pub fn failing_keywords(self, retryable: bool) -> Self {
        let name = self.name.clone();
        self.with_keywords(move |_, _| Err(stub_error(&name, "keywords unavailable", retryable)))
    }

    /// Fixed validation answer regardless of candidates.
    pub fn with_persons(mut self, persons: Vec<ConfirmedPerson>) -> Self {
        self.persons = Some(Ok(persons));
        self
    }

    pub fn failing_persons(mut self, retryable: bool) -> Self {
        self.persons = Some(Err(stub_error(&self.name, "validation unavailable", retryable)));
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn keyword_calls(&self) -> usize {
        self.keyword_calls.load(Ordering::SeqCst)
    }

    pub fn person_calls(&self) -> usize {
        self.person_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.summary_calls() + self.keyword_calls() + self.person_calls()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn stub_error(name: &str, message: &str, retryable: bool) -> ProviderError {
    if retryable {
        ProviderError::retryable(name, message)
    } else {
        ProviderError::fatal(name, message)
    }
}

fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.find(['.', '\n']) {
        Some(idx) => trimmed[..idx].trim().to_string(),
        None => trimmed.to_string(),
    }
}

fn distinct_words(text: &str, max: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() < 3 {
            continue;
        }
        let word = word.to_lowercase();
        if !out.contains(&word) {
            out.push(word);
        }
        if out.len() >= max {
            break;
        }
    }
    out
}

#[async_trait]
impl TextGenerator for StubGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.pause().await;
        Err(ProviderError::fatal(&self.name, "raw completion not supported"))
    }

    async fn summarize(&self, text: &str, _opts: &SummaryOptions) -> Result<String, ProviderError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        (self.summary)(text)
    }

    async fn extract_keywords(&self, text: &str, max_count: usize) -> Result<Vec<String>, ProviderError> {
        self.keyword_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let mut keywords = (self.keywords)(text, max_count)?;
        keywords.truncate(max_count);
        Ok(keywords)
    }

    async fn validate_candidate_names(
        &self,
        _text: &str,
        _title: &str,
        candidates: &[String],
    ) -> Result<Vec<ConfirmedPerson>, ProviderError> {
        self.person_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        match &self.persons {
            Some(answer) => answer.clone(),
            None => Ok(candidates
                .iter()
                .map(|name| ConfirmedPerson::new(name, 0.9))
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_answers_are_deterministic() {
        let stub = StubGenerator::new("stub");
        let text = "Deploy the Rust service. Then deploy again with tokio";
        let a = stub.extract_keywords(text, 4).await.unwrap();
        let b = stub.extract_keywords(text, 4).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec!["deploy", "the", "rust", "service"]);
        assert_eq!(
            stub.summarize(text, &SummaryOptions::default()).await.unwrap(),
            "Deploy the Rust service"
        );
        assert_eq!(stub.keyword_calls(), 2);
        assert_eq!(stub.summary_calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_carry_retryable_flag() {
        let stub = StubGenerator::new("stub").failing_summary(true).failing_persons(false);
        assert!(stub.summarize("x", &SummaryOptions::default()).await.unwrap_err().retryable);
        let err = stub
            .validate_candidate_names("x", "t", &["Jane Doe".to_string()])
            .await
            .unwrap_err();
        assert!(!err.retryable);
    }
}
