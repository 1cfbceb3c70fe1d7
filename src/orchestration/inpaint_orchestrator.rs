// Inpaint Orchestrator: normalize -> encode -> model -> decode -> crop back
//
// The returned image always has the caller's dimensions and channel order.
// Any failure along the way fails the run; no partial image is produced.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::core::errors::{InpaintError, InpaintResult};
use crate::core::types::{ColorImage, Mask};
use crate::processing::geometry::normalize;
use crate::processing::tensor_codec::{decode, encode_image, encode_mask};
use crate::services::inpainting::InpaintModel;
use crate::services::model_slot::ModelSlot;
use crate::utils::metrics::Metrics;

pub struct InpaintOrchestrator {
    model: Arc<ModelSlot<dyn InpaintModel>>,
    pad_stride: u32,
    metrics: Option<Metrics>,
}

impl InpaintOrchestrator {
    pub fn new(model: Arc<ModelSlot<dyn InpaintModel>>, pad_stride: u32, metrics: Option<Metrics>) -> Self {
        Self {
            model,
            pad_stride,
            metrics,
        }
    }

    pub fn model(&self) -> &ModelSlot<dyn InpaintModel> {
        &self.model
    }

    /// Run the whole pipeline on the blocking pool
    #[instrument(skip(self, image, mask), fields(width = image.width(), height = image.height()))]
    pub async fn inpaint(&self, image: ColorImage, mask: Mask) -> InpaintResult<ColorImage> {
        let model = self.model.clone();
        let pad_stride = self.pad_stride;
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || run(&model, pad_stride, &image, &mask))
            .await
            .map_err(|e| InpaintError::TaskJoinFailed(e.to_string()))
            .and_then(|r| r);

        if let Some(m) = &self.metrics {
            m.record_inpaint(result.is_ok(), started.elapsed());
        }
        match &result {
            Ok(_) => info!("Inpainting completed in {:.2}s", started.elapsed().as_secs_f64()),
            Err(e) => warn!("{}", e),
        }
        result
    }

    /// Synchronous pipeline, for callers already off the async runtime
    pub fn inpaint_blocking(&self, image: &ColorImage, mask: &Mask) -> InpaintResult<ColorImage> {
        run(&self.model, self.pad_stride, image, mask)
    }
}

fn run(
    slot: &ModelSlot<dyn InpaintModel>,
    pad_stride: u32,
    image: &ColorImage,
    mask: &Mask,
) -> InpaintResult<ColorImage> {
    let model = slot.get().map_err(InpaintError::ModelUnavailable)?;
    let model_order = model.channel_order();

    let padded = normalize(&image.to_order(model_order), mask, pad_stride)?;
    debug!(
        "Padded {}x{} -> {:?} (stride {}), {} masked pixels",
        padded.original_width,
        padded.original_height,
        padded.padded_dimensions(),
        pad_stride,
        padded.mask.coverage()
    );

    let image_tensor = encode_image(&padded.image);
    let mask_tensor = encode_mask(&padded.mask);

    let output = model
        .inpaint(image_tensor, mask_tensor)
        .map_err(InpaintError::Model)?;

    let restored = decode(
        output.view(),
        padded.original_height,
        padded.original_width,
        model_order,
    )?;

    Ok(restored.to_order(image.order()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ImagingError;
    use crate::core::types::{ChannelOrder, InpaintResponse};
    use axum::http::StatusCode;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use ndarray::{Array4, Axis};
    use parking_lot::Mutex;

    /// Paints every masked pixel white and records what it was fed
    struct WhiteFill {
        order: ChannelOrder,
        seen_shapes: Mutex<Vec<Vec<usize>>>,
        first_pixel: Mutex<Option<[f32; 3]>>,
    }

    impl WhiteFill {
        fn new(order: ChannelOrder) -> Self {
            Self {
                order,
                seen_shapes: Mutex::new(Vec::new()),
                first_pixel: Mutex::new(None),
            }
        }
    }

    impl InpaintModel for WhiteFill {
        fn channel_order(&self) -> ChannelOrder {
            self.order
        }

        fn inpaint(&self, image: Array4<f32>, mask: Array4<f32>) -> anyhow::Result<Array4<f32>> {
            self.seen_shapes.lock().push(image.shape().to_vec());
            self.seen_shapes.lock().push(mask.shape().to_vec());
            *self.first_pixel.lock() = Some([
                image[[0, 0, 0, 0]],
                image[[0, 1, 0, 0]],
                image[[0, 2, 0, 0]],
            ]);

            let mut out = image;
            let mask = mask.index_axis(Axis(1), 0).to_owned();
            for mut channel in out.axis_iter_mut(Axis(1)) {
                channel.zip_mut_with(&mask, |px, &m| {
                    if m > 0.5 {
                        *px = 1.0;
                    }
                });
            }
            Ok(out)
        }
    }

    struct Broken;

    impl InpaintModel for Broken {
        fn inpaint(&self, _: Array4<f32>, _: Array4<f32>) -> anyhow::Result<Array4<f32>> {
            anyhow::bail!("session run failed")
        }
    }

    fn page(width: u32, height: u32, order: ChannelOrder) -> ColorImage {
        ColorImage::new(
            RgbImage::from_fn(width, height, |x, y| Rgb([10 + x as u8, 20 + y as u8, 200])),
            order,
        )
    }

    fn square_mask(width: u32, height: u32) -> Mask {
        let mut gray = GrayImage::new(width, height);
        for y in 2..5 {
            for x in 3..6 {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        Mask::from_gray(&gray)
    }

    fn orchestrator(model: Arc<dyn InpaintModel>) -> InpaintOrchestrator {
        InpaintOrchestrator::new(Arc::new(ModelSlot::ready("inpainting", model)), 8, None)
    }

    #[tokio::test]
    async fn test_output_matches_input_geometry() {
        let model = Arc::new(WhiteFill::new(ChannelOrder::Rgb));
        let orchestrator = orchestrator(model.clone());

        let image = page(13, 10, ChannelOrder::Rgb);
        let result = orchestrator.inpaint(image.clone(), square_mask(13, 10)).await.unwrap();

        assert_eq!(result.dimensions(), (13, 10));
        assert_eq!(result.order(), ChannelOrder::Rgb);
        // Model saw stride-aligned tensors
        assert_eq!(
            *model.seen_shapes.lock(),
            vec![vec![1, 3, 16, 16], vec![1, 1, 16, 16]]
        );

        assert_eq!(result.pixels().get_pixel(4, 3).0, [255, 255, 255]);
        assert_eq!(result.pixels().get_pixel(0, 0), image.pixels().get_pixel(0, 0));
        assert_eq!(result.pixels().get_pixel(12, 9), image.pixels().get_pixel(12, 9));
    }

    #[tokio::test]
    async fn test_channel_order_is_swapped_at_the_model_boundary() {
        let model = Arc::new(WhiteFill::new(ChannelOrder::Rgb));
        let orchestrator = orchestrator(model.clone());

        // BGR input: stored [10, 20, 200] means blue=10, red=200
        let image = page(8, 8, ChannelOrder::Bgr);
        let result = orchestrator.inpaint(image.clone(), square_mask(8, 8)).await.unwrap();

        let fed = model.first_pixel.lock().unwrap();
        assert!((fed[0] - 200.0 / 255.0).abs() < 1e-6);
        assert!((fed[2] - 10.0 / 255.0).abs() < 1e-6);

        assert_eq!(result.order(), ChannelOrder::Bgr);
        assert_eq!(result.pixels().get_pixel(0, 0), image.pixels().get_pixel(0, 0));
    }

    #[test]
    fn test_model_failure_is_reported_with_cause() {
        let orchestrator = orchestrator(Arc::new(Broken));
        let err = orchestrator
            .inpaint_blocking(&page(8, 8, ChannelOrder::Rgb), &square_mask(8, 8))
            .unwrap_err();

        assert!(matches!(err, InpaintError::Model(_)));
        assert!(err.to_string().contains("session run failed"));

        let (status, body) = InpaintResponse::from_error(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.success);
        assert!(body.image.is_none());
    }

    #[test]
    fn test_unavailable_model_fails_every_call() {
        let slot: ModelSlot<dyn InpaintModel> =
            ModelSlot::new("inpainting", || anyhow::bail!("weights missing"));
        let orchestrator = InpaintOrchestrator::new(Arc::new(slot), 8, None);

        for _ in 0..2 {
            let err = orchestrator
                .inpaint_blocking(&page(8, 8, ChannelOrder::Rgb), &square_mask(8, 8))
                .unwrap_err();
            assert!(matches!(err, InpaintError::ModelUnavailable(ref m) if m.contains("weights missing")));

            let (status, body) = InpaintResponse::from_error(&err);
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert!(!body.success);
            assert!(body.message.contains("weights missing"));
        }
    }

    #[test]
    fn test_empty_image_is_rejected_before_inference() {
        let model = Arc::new(WhiteFill::new(ChannelOrder::Rgb));
        let orchestrator = orchestrator(model.clone());

        let err = orchestrator
            .inpaint_blocking(&page(0, 0, ChannelOrder::Rgb), &Mask::from_gray(&GrayImage::new(0, 0)))
            .unwrap_err();

        assert!(matches!(err, InpaintError::Imaging(ImagingError::DimensionMismatch { .. })));
        assert!(model.seen_shapes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let metrics = Metrics::new();
        let slot = Arc::new(ModelSlot::ready(
            "inpainting",
            Arc::new(Broken) as Arc<dyn InpaintModel>,
        ));
        let orchestrator = InpaintOrchestrator::new(slot, 8, Some(metrics.clone()));

        let _ = orchestrator
            .inpaint(page(8, 8, ChannelOrder::Rgb), square_mask(8, 8))
            .await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.inpaint_runs, 1);
        assert_eq!(snapshot.inpaint_failures, 1);
    }
}
