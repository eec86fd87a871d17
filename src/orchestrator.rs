//! Concurrent (variant × engine) detection fan-out.
//!
//! Every pair runs as its own blocking call behind a shared permit pool and
//! carries its own timeout. Failed, timed-out and panicking calls become
//! diagnostics; nothing a single call does can fail the batch. Cancellation
//! stops collection but keeps whatever already came back.

use crate::config::ExtractOptions;
use crate::engine::{RecognitionEngine, TextBox};
use crate::error::ExtractError;
use crate::model::{Diagnostic, RawDetection};
use crate::preprocessing::{PreprocessingVariant, VariantKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Everything collected from one fan-out
#[derive(Debug, Default)]
pub struct DetectionBatch {
    /// Ordered by variant, then engine id, then the engine's own output order
    pub detections: Vec<RawDetection>,
    pub diagnostics: Vec<Diagnostic>,
    /// Distinct engines the batch was run with
    pub engines_attempted: usize,
    pub calls_attempted: usize,
    pub calls_failed: usize,
    pub cancelled: bool,
}

struct CallOutcome {
    variant: VariantKind,
    engine: String,
    elapsed_ms: u64,
    result: Result<Vec<TextBox>, ExtractError>,
}

pub struct Orchestrator {
    per_call_timeout: Duration,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(per_call_timeout: Duration, concurrency: usize) -> Self {
        Self {
            per_call_timeout,
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_options(options: &ExtractOptions) -> Self {
        Self::new(options.per_call_timeout(), options.concurrency())
    }

    /// Run every engine on every variant and gather the detections
    pub async fn run(
        &self,
        variants: &[PreprocessingVariant],
        engines: &[Arc<dyn RecognitionEngine>],
        cancel: &CancellationToken,
    ) -> DetectionBatch {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut calls: JoinSet<CallOutcome> = JoinSet::new();

        for variant in variants {
            for engine in engines {
                let permits = Arc::clone(&permits);
                let engine = Arc::clone(engine);
                let image = Arc::clone(&variant.image);
                let kind = variant.kind;
                let budget = self.per_call_timeout;

                calls.spawn(async move {
                    let engine_id = engine.profile().id.clone();
                    // the clock starts once a worker is free
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return CallOutcome {
                                variant: kind,
                                engine: engine_id,
                                elapsed_ms: 0,
                                result: Err(ExtractError::Internal("worker pool closed".to_string())),
                            }
                        }
                    };

                    let start = Instant::now();
                    let call = tokio::task::spawn_blocking(move || engine.detect(&image));
                    let result = match tokio::time::timeout(budget, call).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(join_error)) => Err(ExtractError::Internal(format!(
                            "engine call panicked: {}",
                            join_error
                        ))),
                        Err(_) => Err(ExtractError::Internal(format!(
                            "timed out after {}ms",
                            budget.as_millis()
                        ))),
                    };

                    CallOutcome {
                        variant: kind,
                        engine: engine_id,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                        result,
                    }
                });
            }
        }

        let mut batch = DetectionBatch {
            engines_attempted: engines.len(),
            calls_attempted: calls.len(),
            ..Default::default()
        };
        let mut failures: Vec<(VariantKind, String, String)> = Vec::new();
        let mut completed = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let abandoned = calls.len();
                    calls.abort_all();
                    tracing::warn!(
                        "Detection cancelled: {} calls completed, {} abandoned",
                        completed,
                        abandoned
                    );
                    batch.cancelled = true;
                    batch.diagnostics.push(Diagnostic::Cancelled { completed, abandoned });
                    break;
                }
                joined = calls.join_next() => match joined {
                    None => break,
                    Some(Ok(outcome)) => {
                        completed += 1;
                        match outcome.result {
                            Ok(boxes) => {
                                tracing::debug!(
                                    "{} on {}: {} boxes in {}ms",
                                    outcome.engine,
                                    outcome.variant.as_str(),
                                    boxes.len(),
                                    outcome.elapsed_ms
                                );
                                batch.detections.extend(
                                    boxes
                                        .into_iter()
                                        .filter_map(|b| to_detection(b, outcome.variant, &outcome.engine)),
                                );
                            }
                            Err(err) => {
                                tracing::warn!(
                                    "{} on {} failed: {}",
                                    outcome.engine,
                                    outcome.variant.as_str(),
                                    err
                                );
                                let reason = match err {
                                    ExtractError::EngineUnavailable { reason, .. } => reason,
                                    ExtractError::Internal(reason) => reason,
                                    other => other.to_string(),
                                };
                                failures.push((outcome.variant, outcome.engine, reason));
                            }
                        }
                    }
                    Some(Err(join_error)) => {
                        completed += 1;
                        batch.diagnostics.push(Diagnostic::Recovered(ExtractError::Internal(format!(
                            "detection task failed: {}",
                            join_error
                        ))));
                        batch.calls_failed += 1;
                    }
                },
            }
        }

        // completion order is scheduling noise; fix the output order
        batch
            .detections
            .sort_by(|a, b| a.source_key().cmp(&b.source_key()));
        failures.sort();
        batch.calls_failed += failures.len();
        let mut diagnostics: Vec<Diagnostic> = failures
            .into_iter()
            .map(|(variant, engine, reason)| {
                Diagnostic::Recovered(ExtractError::EngineUnavailable {
                    engine,
                    variant: variant.as_str().to_string(),
                    reason,
                })
            })
            .collect();
        diagnostics.append(&mut batch.diagnostics);
        batch.diagnostics = diagnostics;

        tracing::info!(
            "Detection finished: {} detections from {}/{} calls ({} failed)",
            batch.detections.len(),
            completed,
            batch.calls_attempted,
            batch.calls_failed
        );
        batch
    }
}

fn to_detection(text_box: TextBox, variant: VariantKind, engine: &str) -> Option<RawDetection> {
    if text_box.text.trim().is_empty() {
        return None;
    }
    let score = if text_box.score.is_nan() {
        0.0
    } else {
        text_box.score.clamp(0.0, 1.0)
    };
    Some(RawDetection {
        text: text_box.text,
        bbox: text_box.bbox,
        score,
        source_variant: variant,
        source_engine: engine.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DetectionMode, EngineProfile, Script};
    use crate::geometry::Rect;
    use image::DynamicImage;

    struct FixedEngine {
        profile: EngineProfile,
        text: &'static str,
        delay: Duration,
        fail: bool,
    }

    impl FixedEngine {
        fn new(id: &str, text: &'static str) -> Self {
            Self {
                profile: EngineProfile::new(id, [Script::Latin], DetectionMode::Standard),
                text,
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    impl RecognitionEngine for FixedEngine {
        fn profile(&self) -> &EngineProfile {
            &self.profile
        }

        fn detect(&self, _image: &DynamicImage) -> Result<Vec<TextBox>, ExtractError> {
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(ExtractError::EngineUnavailable {
                    engine: self.profile.id.clone(),
                    variant: String::new(),
                    reason: "model missing".to_string(),
                });
            }
            Ok(vec![
                TextBox {
                    text: self.text.to_string(),
                    bbox: Rect::new(0.0, 0.0, 50.0, 10.0),
                    score: 1.7,
                },
                TextBox {
                    text: "  ".to_string(),
                    bbox: Rect::new(0.0, 20.0, 50.0, 30.0),
                    score: 0.5,
                },
            ])
        }
    }

    fn variants(kinds: &[VariantKind]) -> Vec<PreprocessingVariant> {
        kinds
            .iter()
            .map(|&kind| PreprocessingVariant {
                kind,
                image: Arc::new(DynamicImage::new_rgb8(4, 4)),
                time_ms: 0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_collects_every_pair_in_stable_order() {
        let engines: Vec<Arc<dyn RecognitionEngine>> = vec![
            Arc::new(FixedEngine::new("b", "beta")),
            Arc::new(FixedEngine::new("a", "alpha")),
        ];
        let batch = Orchestrator::new(Duration::from_secs(5), 3)
            .run(
                &variants(&[VariantKind::Original, VariantKind::Contrast]),
                &engines,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(batch.calls_attempted, 4);
        assert_eq!(batch.calls_failed, 0);
        let keys: Vec<(VariantKind, &str)> = batch.detections.iter().map(|d| d.source_key()).collect();
        assert_eq!(
            keys,
            vec![
                (VariantKind::Original, "a"),
                (VariantKind::Original, "b"),
                (VariantKind::Contrast, "a"),
                (VariantKind::Contrast, "b"),
            ]
        );
        // empty text dropped, score clamped
        assert!(batch.detections.iter().all(|d| d.score == 1.0));
    }

    #[tokio::test]
    async fn test_failure_and_timeout_become_diagnostics() {
        let mut broken = FixedEngine::new("broken", "x");
        broken.fail = true;
        let mut slow = FixedEngine::new("slow", "late");
        slow.delay = Duration::from_millis(300);
        let engines: Vec<Arc<dyn RecognitionEngine>> = vec![
            Arc::new(FixedEngine::new("ok", "fine")),
            Arc::new(broken),
            Arc::new(slow),
        ];

        let batch = Orchestrator::new(Duration::from_millis(50), 4)
            .run(&variants(&[VariantKind::Original]), &engines, &CancellationToken::new())
            .await;

        assert_eq!(batch.detections.len(), 1);
        assert_eq!(batch.detections[0].text, "fine");
        assert_eq!(batch.calls_failed, 2);
        let rendered: Vec<String> = batch.diagnostics.iter().map(|d| d.to_string()).collect();
        assert!(rendered[0].contains("'broken'") && rendered[0].contains("model missing"));
        assert!(rendered[1].contains("'slow'") && rendered[1].contains("timed out after 50ms"));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_partial_results() {
        let mut slow = FixedEngine::new("slow", "late");
        slow.delay = Duration::from_millis(1000);
        let engines: Vec<Arc<dyn RecognitionEngine>> =
            vec![Arc::new(FixedEngine::new("fast", "early")), Arc::new(slow)];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let batch = Orchestrator::new(Duration::from_secs(10), 2)
            .run(&variants(&[VariantKind::Original]), &engines, &cancel)
            .await;

        assert!(batch.cancelled);
        assert_eq!(batch.detections.len(), 1);
        assert_eq!(batch.detections[0].text, "early");
        assert!(batch
            .diagnostics
            .iter()
            .any(|d| d.to_string().starts_with("Cancelled")));
    }
}
