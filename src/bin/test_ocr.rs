//! OCR smoke test against the local model, bypassing the HTTP layer
//! Run with: cargo run --release --bin test_ocr -- <image_path> [left top width height]...

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use panelpachi_ai::core::Selection;
use panelpachi_ai::orchestration::OcrOrchestrator;
use panelpachi_ai::services::{ModelSlot, OcrModel, OcrService};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("panelpachi_ai=debug,ort=off")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let sample_path = args.get(1).cloned().unwrap_or_else(|| "test_sample.png".to_string());

    if !Path::new(&sample_path).exists() {
        eprintln!("Image not found: {}", sample_path);
        std::process::exit(1);
    }

    info!("Loading image: {}", sample_path);
    let image = image::open(&sample_path)?;
    let image = image::DynamicImage::ImageRgb8(image.to_rgb8());
    info!("Image dimensions: {}x{}", image.width(), image.height());

    // Remaining args are rectangles in groups of four; default is the whole image
    let numbers: Vec<f64> = args
        .iter()
        .skip(2)
        .map(|a| a.parse::<f64>().with_context(|| format!("Not a number: {}", a)))
        .collect::<Result<_>>()?;
    let selections: Vec<Selection> = if numbers.is_empty() {
        vec![Selection {
            id: "full".to_string(),
            left: 0.0,
            top: 0.0,
            width: image.width() as f64,
            height: image.height() as f64,
        }]
    } else {
        numbers
            .chunks_exact(4)
            .enumerate()
            .map(|(i, r)| Selection {
                id: (i + 1).to_string(),
                left: r[0],
                top: r[1],
                width: r[2],
                height: r[3],
            })
            .collect()
    };

    let models_dir = std::env::var("OCR_MODELS_DIR").unwrap_or_else(|_| "models".to_string());
    info!("Initializing OCR service from: {}", models_dir);
    let slot: ModelSlot<dyn OcrModel> = ModelSlot::new("ocr", move || {
        Ok(Arc::new(OcrService::new(Path::new(&models_dir), None)?) as Arc<dyn OcrModel>)
    });
    let orchestrator = OcrOrchestrator::new(Arc::new(slot), None);

    let items = orchestrator.recognize_all_blocking(&image, &selections)?;

    println!("\n=== Results ===");
    for item in items {
        println!("  [{}] {}", item.id, item.text);
    }

    Ok(())
}
