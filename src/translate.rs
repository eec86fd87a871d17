//! Optional translation of non-Latin spans before classification.
//!
//! Classification keywords are richest in English, so spans written in
//! another script can be passed through a translator first. The pre-translation
//! text is kept on the span.

use crate::engine::Script;
use crate::error::ExtractError;
use crate::model::{CanonicalSpan, Diagnostic};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone)]
pub enum TranslateError {
    /// The service could not be reached at all; later calls would fail the same way
    #[error("service unreachable: {0}")]
    Unreachable(String),

    /// The service answered but could not translate this text
    #[error("{0}")]
    Rejected(String),
}

pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError>;
}

/// Client for a LibreTranslate-compatible `/translate` endpoint
pub struct HttpTranslator {
    url: String,
    agent: ureq::Agent,
}

impl HttpTranslator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }
}

impl Translator for HttpTranslator {
    fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        let body = serde_json::json!({
            "q": text,
            "source": "auto",
            "target": target_lang,
            "format": "text",
        })
        .to_string();

        let response = self
            .agent
            .post(format!("{}/translate", self.url))
            .header("Content-Type", "application/json")
            .send(body.as_str())
            .map_err(|e| match e {
                ureq::Error::StatusCode(code) => TranslateError::Rejected(format!("service answered {}", code)),
                other => TranslateError::Unreachable(other.to_string()),
            })?;

        let bytes = response
            .into_body()
            .read_to_vec()
            .map_err(|e| TranslateError::Unreachable(format!("failed to read response: {}", e)))?;

        let json: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| TranslateError::Rejected(format!("invalid response: {}", e)))?;

        json.get("translatedText")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| TranslateError::Rejected("response has no translatedText".to_string()))
    }
}

fn needs_translation(text: &str) -> bool {
    !matches!(Script::detect(text), Some(Script::Latin) | None)
}

/// Translate every span written in a non-Latin script in place.
///
/// Failures leave the span untouched and come back as diagnostics. An
/// unreachable service or a cancelled `cancel` stops the pass; the spans not
/// yet sent keep their original text and share one diagnostic.
pub fn translate_spans(
    spans: &mut [CanonicalSpan],
    translator: &dyn Translator,
    target_lang: &str,
    cancel: &CancellationToken,
) -> Vec<Diagnostic> {
    let pending: Vec<usize> = spans
        .iter()
        .enumerate()
        .filter(|(_, span)| needs_translation(&span.text))
        .map(|(i, _)| i)
        .collect();

    let mut diagnostics = Vec::new();
    let mut translated = 0;

    for (done, &i) in pending.iter().enumerate() {
        let remaining = pending.len() - done;
        if cancel.is_cancelled() {
            tracing::warn!("Translation cancelled with {} spans left", remaining);
            diagnostics.push(Diagnostic::Recovered(ExtractError::TranslationFailed(format!(
                "cancelled, {} spans left untranslated",
                remaining
            ))));
            break;
        }

        let span = &mut spans[i];
        match translator.translate(&span.text, target_lang) {
            Ok(text) => {
                let text = text.trim().to_string();
                if !text.is_empty() && text != span.text {
                    span.original_text = Some(std::mem::replace(&mut span.text, text));
                    translated += 1;
                }
            }
            Err(TranslateError::Unreachable(reason)) => {
                tracing::warn!("Translation service unreachable: {}", reason);
                diagnostics.push(Diagnostic::Recovered(ExtractError::TranslationFailed(format!(
                    "service unreachable ({}), {} spans left untranslated",
                    reason, remaining
                ))));
                break;
            }
            Err(err) => {
                tracing::warn!("Translation of '{}' failed: {}", span.text, err);
                diagnostics.push(Diagnostic::Recovered(ExtractError::TranslationFailed(format!(
                    "'{}': {}",
                    span.text, err
                ))));
            }
        }
    }

    tracing::debug!("Translated {} of {} spans to '{}'", translated, pending.len(), target_lang);
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::model::RawDetection;
    use crate::preprocessing::VariantKind;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn span(text: &str) -> CanonicalSpan {
        CanonicalSpan::from_detection(RawDetection {
            text: text.to_string(),
            bbox: Rect::new(0.0, 0.0, 100.0, 20.0),
            score: 0.9,
            source_variant: VariantKind::Original,
            source_engine: "a".to_string(),
        })
    }

    struct MapTranslator(HashMap<&'static str, &'static str>);

    impl Translator for MapTranslator {
        fn translate(&self, text: &str, _target_lang: &str) -> Result<String, TranslateError> {
            self.0
                .get(text)
                .map(|s| s.to_string())
                .ok_or_else(|| TranslateError::Rejected(format!("unknown text '{}'", text)))
        }
    }

    struct CountingTranslator(AtomicUsize);

    impl Translator for CountingTranslator {
        fn translate(&self, text: &str, _target_lang: &str) -> Result<String, TranslateError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    }

    struct UnreachableTranslator(AtomicUsize);

    impl Translator for UnreachableTranslator {
        fn translate(&self, _text: &str, _target_lang: &str) -> Result<String, TranslateError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TranslateError::Unreachable("connection refused".to_string()))
        }
    }

    /// Takes a while per call and fires `cancel` once `after` calls are done
    struct SlowTranslator {
        calls: AtomicUsize,
        after: usize,
        cancel: CancellationToken,
    }

    impl Translator for SlowTranslator {
        fn translate(&self, text: &str, _target_lang: &str) -> Result<String, TranslateError> {
            std::thread::sleep(Duration::from_millis(20));
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.after {
                self.cancel.cancel();
            }
            Ok(format!("translated {}", text))
        }
    }

    #[test]
    fn test_translates_non_latin_spans() {
        let translator = MapTranslator(HashMap::from([("目標金額", "Target amount")]));
        let mut spans = vec![span("目標金額"), span("Save The Ocean")];

        let diagnostics = translate_spans(&mut spans, &translator, "en", &CancellationToken::new());
        assert!(diagnostics.is_empty());
        assert_eq!(spans[0].text, "Target amount");
        assert_eq!(spans[0].original_text.as_deref(), Some("目標金額"));
        assert_eq!(spans[1].text, "Save The Ocean");
        assert_eq!(spans[1].original_text, None);
    }

    #[test]
    fn test_failure_keeps_text_and_reports() {
        let translator = MapTranslator(HashMap::new());
        let mut spans = vec![span("후원자 120명"), span("목표 금액")];

        let diagnostics = translate_spans(&mut spans, &translator, "en", &CancellationToken::new());
        // a rejected span does not stop the others
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics[0].to_string().starts_with("TranslationFailed"));
        assert_eq!(spans[0].text, "후원자 120명");
    }

    #[test]
    fn test_latin_and_numeric_text_never_sent() {
        let translator = CountingTranslator(AtomicUsize::new(0));
        let mut spans = vec![span("Save The Ocean"), span("$265,400"), span("支援総額")];

        translate_spans(&mut spans, &translator, "en", &CancellationToken::new());
        assert_eq!(translator.0.load(Ordering::SeqCst), 1);
        // identity translation does not mark the span as translated
        assert_eq!(spans[2].original_text, None);
    }

    #[test]
    fn test_unreachable_service_is_called_once() {
        let translator = UnreachableTranslator(AtomicUsize::new(0));
        let mut spans = vec![span("支援総額"), span("目標金額"), span("支援者"), span("残り")];

        let diagnostics = translate_spans(&mut spans, &translator, "en", &CancellationToken::new());
        assert_eq!(translator.0.load(Ordering::SeqCst), 1);
        assert_eq!(diagnostics.len(), 1);
        let rendered = diagnostics[0].to_string();
        assert!(rendered.starts_with("TranslationFailed"));
        assert!(rendered.contains("4 spans left untranslated"));
        assert!(spans.iter().all(|s| s.original_text.is_none()));
    }

    #[test]
    fn test_cancellation_stops_midway() {
        let cancel = CancellationToken::new();
        let translator = SlowTranslator {
            calls: AtomicUsize::new(0),
            after: 2,
            cancel: cancel.clone(),
        };
        let mut spans: Vec<CanonicalSpan> = ["支援総額", "目標金額", "支援者", "残り", "終了"]
            .into_iter()
            .map(span)
            .collect();

        let diagnostics = translate_spans(&mut spans, &translator, "en", &cancel);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(spans[1].text, "translated 目標金額");
        assert_eq!(spans[2].text, "支援者");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].to_string().contains("cancelled, 3 spans left untranslated"));
    }
}
