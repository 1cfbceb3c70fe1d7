/// Inpainting smoke test: runs the full pipeline on an image/mask pair, or on
/// every image in a directory paired with the same-named mask in another
///
/// Usage: cargo run --release --bin test_inpaint -- <image|dir> <mask|dir> [--output out] [--stride 8]

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use panelpachi_ai::core::{ColorImage, Mask};
use panelpachi_ai::orchestration::InpaintOrchestrator;
use panelpachi_ai::processing::DEFAULT_PAD_STRIDE;
use panelpachi_ai::services::{InpaintModel, LamaInpainter, ModelSlot};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Mask in `mask_dir` sharing the image's file stem, any supported extension
fn find_mask(mask_dir: &Path, stem: &str) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| mask_dir.join(format!("{}.{}", stem, ext)))
        .find(|candidate| candidate.is_file())
}

fn inpaint_file(
    orchestrator: &InpaintOrchestrator,
    image_path: &Path,
    mask_path: &Path,
    output_path: &Path,
) -> Result<()> {
    let image = image::open(image_path)
        .with_context(|| format!("Failed to load image {}", image_path.display()))?;
    let mask = image::open(mask_path)
        .with_context(|| format!("Failed to load mask {}", mask_path.display()))?;

    let image = ColorImage::from_dynamic(&image);
    let mask = Mask::from_dynamic(&mask);
    println!(
        "{}: {}x{}, {} masked pixels",
        image_path.display(),
        image.width(),
        image.height(),
        mask.coverage()
    );

    let started = Instant::now();
    let result = orchestrator.inpaint_blocking(&image, &mask)?;
    result.into_rgb().save(output_path)?;
    println!(
        "  -> {} ({:.2}s)",
        output_path.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn inpaint_directory(
    orchestrator: &InpaintOrchestrator,
    image_dir: &Path,
    mask_dir: &Path,
    output_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut images: Vec<PathBuf> = std::fs::read_dir(image_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();
    images.sort();

    if images.is_empty() {
        println!("No images found in {}", image_dir.display());
        return Ok(());
    }

    let mut processed = 0;
    for image_path in &images {
        let Some(stem) = image_path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(mask_path) = find_mask(mask_dir, stem) else {
            println!("No matching mask found for {}", image_path.display());
            continue;
        };
        let Some(file_name) = image_path.file_name() else {
            continue;
        };

        match inpaint_file(orchestrator, image_path, &mask_path, &output_dir.join(file_name)) {
            Ok(()) => processed += 1,
            Err(e) => eprintln!("Error processing {}: {:#}", image_path.display(), e),
        }
    }

    println!("Processed {} of {} images", processed, images.len());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("panelpachi_ai=debug,ort=off")
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <image|dir> <mask|dir> [--output out] [--stride 8]",
            args[0]
        );
        std::process::exit(1);
    }

    let image_path = PathBuf::from(&args[1]);
    let mask_path = PathBuf::from(&args[2]);
    let mut output_path: Option<PathBuf> = None;
    let mut stride = DEFAULT_PAD_STRIDE;

    let mut i = 3;
    while i < args.len() {
        match (args[i].as_str(), args.get(i + 1)) {
            ("--output" | "-o", Some(value)) => {
                output_path = Some(PathBuf::from(value));
                i += 2;
            }
            ("--stride" | "-s", Some(value)) => {
                stride = value.parse().context("Stride must be a positive integer")?;
                i += 2;
            }
            _ => i += 1,
        }
    }

    let model_path = std::env::var("INPAINT_MODEL_PATH")
        .unwrap_or_else(|_| "models/inpainting/anime-manga-big-lama.onnx".to_string());
    let backend = std::env::var("INFERENCE_BACKEND").ok();
    let slot: ModelSlot<dyn InpaintModel> = ModelSlot::new("inpainting", move || {
        let model = LamaInpainter::new(Path::new(&model_path), backend.as_deref())?;
        Ok(Arc::new(model) as Arc<dyn InpaintModel>)
    });
    let orchestrator = InpaintOrchestrator::new(Arc::new(slot), stride, None);

    if image_path.is_dir() && mask_path.is_dir() {
        let output_dir = output_path.unwrap_or_else(|| PathBuf::from("output"));
        inpaint_directory(&orchestrator, &image_path, &mask_path, &output_dir)
    } else if image_path.is_file() && mask_path.is_file() {
        let output_path = output_path.unwrap_or_else(|| {
            let stem = image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output");
            PathBuf::from(format!("{}_inpainted.png", stem))
        });
        inpaint_file(&orchestrator, &image_path, &mask_path, &output_path)
    } else {
        anyhow::bail!("image and mask must both be files or both be directories")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extensions_are_case_insensitive() {
        assert!(has_image_extension(Path::new("page_01.PNG")));
        assert!(has_image_extension(Path::new("page_01.jpeg")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("no_extension")));
    }

    #[test]
    fn test_mask_is_matched_by_stem() {
        let dir = std::env::temp_dir().join(format!("panelpachi-masks-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("page_01.png"), b"").unwrap();

        assert_eq!(find_mask(&dir, "page_01"), Some(dir.join("page_01.png")));
        assert_eq!(find_mask(&dir, "page_02"), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
