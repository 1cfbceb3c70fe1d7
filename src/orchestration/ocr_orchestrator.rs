// OCR Batch Orchestrator: one result per selection, in input order
//
// Failures are isolated per selection and written inline into that
// selection's text. Only an unavailable model fails the whole call.

use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::errors::OcrError;
use crate::core::types::{OcrItem, Selection};
use crate::orchestration::batch::{run_batch, Isolate};
use crate::processing::region_extractor::extract;
use crate::services::model_slot::ModelSlot;
use crate::services::ocr::OcrModel;
use crate::utils::metrics::Metrics;

/// Text reported for a selection where the model found nothing
pub const NO_TEXT_DETECTED: &str = "No text detected";

/// Prefix of inline per-selection errors
const ERROR_PREFIX: &str = "Error: ";

pub struct OcrOrchestrator {
    model: Arc<ModelSlot<dyn OcrModel>>,
    metrics: Option<Metrics>,
}

/// Normalize a model answer: blank or missing text becomes the marker
fn text_or_marker(text: Option<String>) -> String {
    match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => NO_TEXT_DETECTED.to_string(),
    }
}

impl OcrOrchestrator {
    pub fn new(model: Arc<ModelSlot<dyn OcrModel>>, metrics: Option<Metrics>) -> Self {
        Self { model, metrics }
    }

    pub fn model(&self) -> &ModelSlot<dyn OcrModel> {
        &self.model
    }

    /// Recognize every selection on the blocking pool
    #[instrument(skip(self, image, selections), fields(selections = selections.len()))]
    pub async fn recognize_all(
        &self,
        image: Arc<DynamicImage>,
        selections: Vec<Selection>,
    ) -> Result<Vec<OcrItem>, OcrError> {
        let model = self.model.clone();
        let started = Instant::now();
        let count = selections.len();

        let items = tokio::task::spawn_blocking(move || recognize(&model, &image, &selections))
            .await
            .map_err(|e| OcrError::TaskJoinFailed(e.to_string()))??;

        if let Some(m) = &self.metrics {
            let errors = items.iter().filter(|i| i.text.starts_with(ERROR_PREFIX)).count();
            let empty = items.iter().filter(|i| i.text == NO_TEXT_DETECTED).count();
            m.record_ocr_request(count, errors, empty, started.elapsed());
        }

        info!(
            "OCR finished {} selections in {:.2}s",
            count,
            started.elapsed().as_secs_f64()
        );
        Ok(items)
    }

    /// Synchronous variant, for callers already off the async runtime
    pub fn recognize_all_blocking(
        &self,
        image: &DynamicImage,
        selections: &[Selection],
    ) -> Result<Vec<OcrItem>, OcrError> {
        recognize(&self.model, image, selections)
    }
}

fn recognize(
    slot: &ModelSlot<dyn OcrModel>,
    image: &DynamicImage,
    selections: &[Selection],
) -> Result<Vec<OcrItem>, OcrError> {
    let model = slot.get().map_err(OcrError::ModelUnavailable)?;

    let crops = extract(image, selections);
    let ids: Vec<String> = crops.iter().map(|c| c.id.clone()).collect();

    let outcomes = run_batch::<Isolate, _, _, _, _>(crops, |region| -> anyhow::Result<Option<String>> {
        let crop = region.crop?;
        model.recognize(&crop)
    });

    Ok(ids
        .into_iter()
        .zip(outcomes)
        .map(|(id, outcome)| {
            let text = match outcome {
                Ok(text) => text_or_marker(text),
                Err(e) => {
                    warn!("OCR failed for selection {}: {:#}", id, e);
                    format!("{}{}", ERROR_PREFIX, e)
                }
            };
            debug!("Selection {}: {:?}", id, text);
            OcrItem { id, text }
        })
        .collect())
}
