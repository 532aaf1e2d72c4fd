//! Severity classification of failure messages

use arp_core::{Severity, SharedInference};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Keyword tiers, checked most severe first
const TIERS: [(Severity, &str); 4] = [
    (
        Severity::Critical,
        r"\b(critical|fatal|panic(ked)?|segfault|segmentation fault|data loss|corrupt(ed|ion)?|security|breach|out of memory|production (is )?down|outage|disk full)\b",
    ),
    (
        Severity::High,
        r"\b(build failed|compil(e|ation) (error|failed)|no such module|cannot find|not found|undefined (reference|symbol)|linker? error|crash(ed)?|deploy(ment)? failed|tests? failed|exception)\b",
    ),
    (
        Severity::Medium,
        r"\b(warning|deprecat(ed|ion)|slow|timed? ?out|retry(ing)?|flaky|unstable|lint)\b",
    ),
    (
        Severity::Low,
        r"\b(typo|cosmetic|style|format(ting)?|whitespace|minor|docs?|documentation|todo)\b",
    ),
];

fn tiers() -> &'static [(Severity, Option<Regex>)] {
    static TIERS_RE: OnceLock<Vec<(Severity, Option<Regex>)>> = OnceLock::new();
    TIERS_RE.get_or_init(|| {
        TIERS
            .iter()
            .map(|(severity, pattern)| {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok();
                (*severity, re)
            })
            .collect()
    })
}

/// Keyword classification; unmatched messages are `medium`
#[must_use]
pub fn classify(message: &str) -> Severity {
    tiers()
        .iter()
        .find(|(_, re)| re.as_ref().is_some_and(|re| re.is_match(message)))
        .map_or(Severity::Medium, |(severity, _)| *severity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Inference,
    Rules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub severity: Severity,
    pub source: ClassificationSource,
}

/// Ask the inference backend first, fall back to keywords
pub async fn classify_assisted(inference: &SharedInference, message: &str) -> Classification {
    let rules = Classification {
        severity: classify(message),
        source: ClassificationSource::Rules,
    };
    if !inference.available().await {
        return rules;
    }
    let prompt = format!(
        "Classify the severity of this software failure as exactly one word \
         (critical, high, medium or low).\n\nFailure: {message}\n\nSeverity:"
    );
    match inference.infer(&prompt).await {
        Ok(answer) => match parse_answer(&answer) {
            Some(severity) => {
                debug!(backend = inference.name(), %severity, "classified by inference");
                Classification {
                    severity,
                    source: ClassificationSource::Inference,
                }
            }
            None => {
                warn!(backend = inference.name(), answer, "unusable classification, using rules");
                rules
            }
        },
        Err(e) => {
            warn!(backend = inference.name(), error = %e, "inference failed, using rules");
            rules
        }
    }
}

/// First severity word in a model answer
fn parse_answer(answer: &str) -> Option<Severity> {
    answer
        .split(|c: char| !c.is_ascii_alphabetic())
        .find_map(|word| word.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arp_core::{InferenceBackend, InferenceError};
    use async_trait::async_trait;
    use std::sync::Arc;

    #[test]
    fn missing_module_is_high() {
        assert_eq!(classify("Build failed: No such module"), Severity::High);
    }

    #[test]
    fn tiers_in_order() {
        assert_eq!(classify("FATAL: database corruption detected"), Severity::Critical);
        assert_eq!(classify("build failed after data loss"), Severity::Critical);
        assert_eq!(classify("3 tests failed"), Severity::High);
        assert_eq!(classify("Deprecation warning in parser"), Severity::Medium);
        assert_eq!(classify("typo in README"), Severity::Low);
        assert_eq!(classify("something odd happened"), Severity::Medium);
    }

    #[test]
    fn answer_parsing() {
        assert_eq!(parse_answer("High"), Some(Severity::High));
        assert_eq!(parse_answer("Severity: critical."), Some(Severity::Critical));
        assert_eq!(parse_answer("no idea"), None);
    }

    struct Fixed(Option<&'static str>);

    #[async_trait]
    impl InferenceBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn available(&self) -> bool {
            self.0.is_some()
        }

        async fn infer(&self, _prompt: &str) -> Result<String, InferenceError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| InferenceError::Unavailable("fixed".into()))
        }
    }

    #[tokio::test]
    async fn assisted_prefers_backend() {
        let backend: SharedInference = Arc::new(Fixed(Some("low")));
        let c = classify_assisted(&backend, "Build failed: No such module").await;
        assert_eq!(c.severity, Severity::Low);
        assert_eq!(c.source, ClassificationSource::Inference);
    }

    #[tokio::test]
    async fn assisted_falls_back_to_rules() {
        let backend: SharedInference = Arc::new(Fixed(None));
        let c = classify_assisted(&backend, "Build failed: No such module").await;
        assert_eq!(c.severity, Severity::High);
        assert_eq!(c.source, ClassificationSource::Rules);

        let garbled: SharedInference = Arc::new(Fixed(Some("¯\\_(ツ)_/¯")));
        let c = classify_assisted(&garbled, "typo").await;
        assert_eq!(c.source, ClassificationSource::Rules);
    }
}
