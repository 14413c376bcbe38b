use std::sync::Arc;

use super::structured::parse_integer;
use super::{ChatRequest, TextService};

const CATEGORY_KEY: &str = "category";

/// Tone of an article, used to pick a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToneCategory {
    Normal,
    Serious,
    /// Classification failed; callers should use their default.
    Unknown,
}

impl ToneCategory {
    /// Voice profile for this tone.
    pub fn voice<'a>(&self, default_voice: &'a str, serious_voice: Option<&'a str>) -> &'a str {
        match (self, serious_voice) {
            (ToneCategory::Serious, Some(serious)) => serious,
            _ => default_voice,
        }
    }
}

/// Single best-effort tone classification call. Never retries.
pub struct ToneClassifier {
    service: Arc<dyn TextService>,
    model: String,
}

impl ToneClassifier {
    pub fn new(service: Arc<dyn TextService>, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    pub fn classify(&self, text: &str) -> ToneCategory {
        if text.trim().is_empty() {
            return ToneCategory::Unknown;
        }

        let request = ChatRequest::structured(
            &self.model,
            "أنت محرر أخبار. صنّف نبرة الخبر: 1 إذا كان جاداً أو حزيناً أو رسمياً، و0 إذا كان عادياً أو خفيفاً.",
            format!(
                "صنّف الخبر التالي وأرجع JSON فقط بالشكل {{\"{CATEGORY_KEY}\": 0}} أو {{\"{CATEGORY_KEY}\": 1}}.\n\n{text}"
            ),
        );

        let category = self
            .service
            .complete(&request)
            .and_then(|reply| parse_integer(&reply, CATEGORY_KEY));

        match category {
            Ok(0) => ToneCategory::Normal,
            Ok(1) => ToneCategory::Serious,
            Ok(other) => {
                log::warn!("Classifier returned out-of-range category {}", other);
                ToneCategory::Unknown
            }
            Err(e) => {
                log::warn!("Tone classification failed: {}", e);
                ToneCategory::Unknown
            }
        }
    }
}
