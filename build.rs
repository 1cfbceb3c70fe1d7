use std::env;

fn main() {
    // Models are loaded from disk at runtime; only remind about the defaults
    let inpaint_model = "models/inpainting/anime-manga-big-lama.onnx";
    let ocr_model = "models/ocr/ocr.onnx";

    for path in [inpaint_model, ocr_model] {
        if !std::path::Path::new(path).exists() {
            println!(
                "cargo:warning=Model not found at {} (endpoints using it will report the model as unavailable)",
                path
            );
        }
    }
    println!("cargo:rerun-if-changed=build.rs");

    // Detect enabled acceleration features
    let mut enabled_features = Vec::new();

    if env::var("CARGO_FEATURE_CUDA").is_ok() {
        enabled_features.push("CUDA");
    }
    if env::var("CARGO_FEATURE_TENSORRT").is_ok() {
        enabled_features.push("TensorRT");
    }
    if env::var("CARGO_FEATURE_DIRECTML").is_ok() {
        enabled_features.push("DirectML");
    }
    if env::var("CARGO_FEATURE_COREML").is_ok() {
        enabled_features.push("CoreML");
    }
    if env::var("CARGO_FEATURE_OPENVINO").is_ok() {
        enabled_features.push("OpenVINO");
    }
    if env::var("CARGO_FEATURE_XNNPACK").is_ok() {
        enabled_features.push("XNNPACK");
    }

    if enabled_features.is_empty() {
        println!("cargo:warning=Building with CPU-only inference (no GPU acceleration)");
        println!("cargo:warning=To enable GPU: cargo build --features cuda (or directml on Windows)");
    } else {
        println!("cargo:warning=Acceleration enabled: {}", enabled_features.join(", "));
    }

    let target = env::var("TARGET").unwrap_or_default();

    if target.contains("windows-gnu") && enabled_features.contains(&"CUDA") {
        println!("cargo:warning=WARNING: CUDA binaries may not be available for Windows GNU target");
        println!("cargo:warning=Consider using DirectML instead: cargo build --features directml");
    }
}
