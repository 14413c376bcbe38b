use std::sync::Arc;
use std::time::Duration;

use super::structured::parse_flag;
use super::{ChatRequest, LlmError, TextService};

/// Reply key the validator must answer with.
pub const VALIDATION_KEY: &str = "is_dialect";

/// Settings for [`DialectRewriter`].
#[derive(Debug, Clone)]
pub struct RewriterConfig {
    pub generator_model: String,
    pub validator_model: String,
    /// Attempts before giving up (at least one is always made).
    pub max_retries: u32,
    /// Pause after a failed service call before the next attempt.
    pub retry_delay: Duration,
    /// Target dialect as an adjective, e.g. "سعودية".
    pub dialect: String,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            generator_model: "gpt-3.5-turbo".to_string(),
            validator_model: "gpt-3.5-turbo".to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            dialect: "سعودية".to_string(),
        }
    }
}

/// Result of one rewrite run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// A candidate passed validation.
    Rewritten { text: String, attempts: u32 },
    /// Every attempt failed or was rejected.
    Exhausted { attempts: u32 },
    /// The service cannot be used at all (e.g. no credentials).
    Unavailable(String),
    /// Source text was empty; no call was made.
    EmptyInput,
}

impl RewriteOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            RewriteOutcome::Rewritten { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            RewriteOutcome::Rewritten { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum RewriteState {
    Attempting,
    Validating(String),
    Succeeded(String),
    Exhausted,
}

/// Generate → validate → retry loop over a [`TextService`].
///
/// A rejected candidate is discarded, never returned as a "best effort".
pub struct DialectRewriter {
    service: Arc<dyn TextService>,
    config: RewriterConfig,
}

impl DialectRewriter {
    pub fn new(service: Arc<dyn TextService>, config: RewriterConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &RewriterConfig {
        &self.config
    }

    /// Rewrite Modern Standard Arabic `source` into the configured dialect.
    pub fn rewrite(&self, source: &str) -> RewriteOutcome {
        if source.trim().is_empty() {
            return RewriteOutcome::EmptyInput;
        }

        let max_attempts = self.config.max_retries.max(1);
        let mut failed = 0u32;
        let mut state = RewriteState::Attempting;

        loop {
            state = match state {
                RewriteState::Attempting => {
                    log::info!("Dialect rewrite attempt {}/{}", failed + 1, max_attempts);
                    match self.generate(source) {
                        Ok(candidate) => RewriteState::Validating(candidate),
                        Err(e) if !e.is_retryable() => {
                            return RewriteOutcome::Unavailable(e.to_string())
                        }
                        Err(e) => {
                            log::warn!("Generation failed: {}", e);
                            self.next_attempt(&mut failed, max_attempts, true)
                        }
                    }
                }
                RewriteState::Validating(candidate) => match self.validate(&candidate) {
                    Ok(true) => {
                        log::info!("Validation accepted the candidate");
                        RewriteState::Succeeded(candidate)
                    }
                    Ok(false) => {
                        log::info!("Validation rejected the candidate, regenerating");
                        self.next_attempt(&mut failed, max_attempts, false)
                    }
                    Err(e) if !e.is_retryable() => return RewriteOutcome::Unavailable(e.to_string()),
                    Err(e @ LlmError::MalformedReply(_)) => {
                        log::warn!("Unparseable validation reply: {}", e);
                        self.next_attempt(&mut failed, max_attempts, false)
                    }
                    Err(e) => {
                        log::warn!("Validation call failed: {}", e);
                        self.next_attempt(&mut failed, max_attempts, true)
                    }
                },
                RewriteState::Succeeded(text) => {
                    return RewriteOutcome::Rewritten {
                        text,
                        attempts: failed + 1,
                    }
                }
                RewriteState::Exhausted => {
                    log::warn!("Dialect rewrite gave up after {} attempts", failed);
                    return RewriteOutcome::Exhausted { attempts: failed };
                }
            };
        }
    }

    fn next_attempt(&self, failed: &mut u32, max_attempts: u32, pause: bool) -> RewriteState {
        *failed += 1;
        if *failed >= max_attempts {
            return RewriteState::Exhausted;
        }
        if pause && !self.config.retry_delay.is_zero() {
            std::thread::sleep(self.config.retry_delay);
        }
        RewriteState::Attempting
    }

    fn generate(&self, source: &str) -> Result<String, LlmError> {
        let dialect = &self.config.dialect;
        let request = ChatRequest::text(
            &self.config.generator_model,
            format!("أنت مذيع بودكاست عربي متخصص في تبسيط الأخبار بلغة سهلة ولهجة {dialect} واضحة."),
            format!("حوّل هذا النص إلى لهجة {dialect} واضحة:\n\n{source}"),
        );
        let text = self.service.complete(&request)?;
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.trim().to_string())
    }

    fn validate(&self, candidate: &str) -> Result<bool, LlmError> {
        let dialect = &self.config.dialect;
        let request = ChatRequest::structured(
            &self.config.validator_model,
            format!("أنت مدقق لغوي. قيّم هل النص التالي مكتوب فعلاً باللهجة ال{dialect} بشكل صحيح وطبيعي."),
            format!(
                "قيّم النص التالي وأرجع النتيجة بصيغة JSON فقط.\n\nالنص:\n{candidate}\n\n\
                 يجب أن يكون الإخراج بهذا الشكل:\n{{\"{VALIDATION_KEY}\": true/false}}"
            ),
        );
        let reply = self.service.complete(&request)?;
        parse_flag(&reply, VALIDATION_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedService;

    fn rewriter(service: &Arc<ScriptedService>, max_retries: u32) -> DialectRewriter {
        DialectRewriter::new(
            Arc::clone(service) as Arc<dyn TextService>,
            RewriterConfig {
                max_retries,
                retry_delay: Duration::ZERO,
                ..Default::default()
            },
        )
    }

    #[test]
    fn accepted_on_first_attempt() {
        let service = Arc::new(ScriptedService::new(
            vec![Ok("هذا الخبر بالسعودي".to_string())],
            vec![Ok(r#"{"is_dialect": true}"#.to_string())],
        ));
        let outcome = rewriter(&service, 3).rewrite("هذا نص بالفصحى");

        assert_eq!(
            outcome,
            RewriteOutcome::Rewritten {
                text: "هذا الخبر بالسعودي".to_string(),
                attempts: 1
            }
        );
        assert_eq!(service.text_calls(), 1);
        assert_eq!(service.structured_calls(), 1);
    }

    #[test]
    fn always_rejected_exhausts_without_returning_candidate() {
        let service = Arc::new(ScriptedService::repeating(
            Ok("مرشح".to_string()),
            Ok(r#"{"is_dialect": false}"#.to_string()),
        ));
        let outcome = rewriter(&service, 3).rewrite("نص");

        assert_eq!(outcome, RewriteOutcome::Exhausted { attempts: 3 });
        assert_eq!(outcome.text(), None);
        assert_eq!(service.text_calls(), 3);
        assert_eq!(service.structured_calls(), 3);
    }

    #[test]
    fn empty_generation_is_retried() {
        let service = Arc::new(ScriptedService::new(
            vec![Err(LlmError::EmptyResponse), Ok("  الثانية  ".to_string())],
            vec![Ok(r#"{"is_dialect": true}"#.to_string())],
        ));
        let outcome = rewriter(&service, 3).rewrite("نص");

        assert_eq!(
            outcome,
            RewriteOutcome::Rewritten {
                text: "الثانية".to_string(),
                attempts: 2
            }
        );
        assert_eq!(service.structured_calls(), 1);
    }

    #[test]
    fn malformed_or_failed_validation_counts_as_an_attempt() {
        let service = Arc::new(ScriptedService::new(
            vec![Ok("أ".to_string()), Ok("ب".to_string()), Ok("ج".to_string())],
            vec![
                Ok("ما أدري".to_string()),
                Err(LlmError::Timeout("30s".to_string())),
                Ok("```json\n{\"is_dialect\": true}\n```".to_string()),
            ],
        ));
        let outcome = rewriter(&service, 3).rewrite("نص");

        assert_eq!(
            outcome,
            RewriteOutcome::Rewritten {
                text: "ج".to_string(),
                attempts: 3
            }
        );
    }

    #[test]
    fn unconfigured_service_is_reported_immediately() {
        let service = Arc::new(ScriptedService::repeating(
            Err(LlmError::NotConfigured),
            Ok(r#"{"is_dialect": true}"#.to_string()),
        ));
        let outcome = rewriter(&service, 3).rewrite("نص");

        assert!(matches!(outcome, RewriteOutcome::Unavailable(_)));
        assert_eq!(service.text_calls(), 1);
    }

    #[test]
    fn validator_losing_configuration_stops_retrying() {
        let service = Arc::new(ScriptedService::repeating(
            Ok("مرشح".to_string()),
            Err(LlmError::NotConfigured),
        ));
        let outcome = rewriter(&service, 3).rewrite("نص");

        assert_eq!(
            outcome,
            RewriteOutcome::Unavailable(LlmError::NotConfigured.to_string())
        );
        assert_eq!(service.text_calls(), 1);
        assert_eq!(service.structured_calls(), 1);
    }

    #[test]
    fn blank_source_makes_no_calls() {
        let service = Arc::new(ScriptedService::repeating(
            Ok("x".to_string()),
            Ok(r#"{"is_dialect": true}"#.to_string()),
        ));
        assert_eq!(rewriter(&service, 3).rewrite("  \n "), RewriteOutcome::EmptyInput);
        assert_eq!(service.text_calls(), 0);
    }

    #[test]
    fn zero_retries_still_makes_one_attempt() {
        let service = Arc::new(ScriptedService::repeating(
            Ok("مرشح".to_string()),
            Ok(r#"{"is_dialect": false}"#.to_string()),
        ));
        assert_eq!(
            rewriter(&service, 0).rewrite("نص"),
            RewriteOutcome::Exhausted { attempts: 1 }
        );
    }

    #[test]
    fn prompts_carry_source_and_candidate() {
        let service = Arc::new(ScriptedService::new(
            vec![Ok("مرشح".to_string())],
            vec![Ok(r#"{"is_dialect": true}"#.to_string())],
        ));
        rewriter(&service, 1).rewrite("النص الأصلي");

        let requests = service.requests();
        assert!(requests[0].user.contains("النص الأصلي"));
        assert!(!requests[0].json_mode);
        assert!(requests[1].user.contains("مرشح"));
        assert!(requests[1].user.contains(VALIDATION_KEY));
        assert!(requests[1].json_mode);
    }
}
