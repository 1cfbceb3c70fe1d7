// Shared ONNX Runtime session builder with hardware acceleration detection
//
// Both the inpainting and OCR models load through here so they agree on
// thread counts and provider order.

use anyhow::{Context, Result};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info, warn};

#[cfg(feature = "tensorrt")]
use ort::execution_providers::TensorRTExecutionProvider;

#[cfg(feature = "cuda")]
use ort::execution_providers::CUDAExecutionProvider;

#[cfg(all(target_os = "macos", feature = "coreml"))]
use ort::execution_providers::CoreMLExecutionProvider;

#[cfg(all(target_os = "windows", feature = "directml"))]
use ort::execution_providers::DirectMLExecutionProvider;

#[cfg(feature = "openvino")]
use ort::execution_providers::OpenVINOExecutionProvider;

#[cfg(feature = "xnnpack")]
use ort::execution_providers::XNNPACKExecutionProvider;

/// Intra-op thread count for CPU inference.
///
/// Windows is capped at 6 threads: past that, synchronization overhead
/// outweighs the extra cores (https://github.com/microsoft/onnxruntime/issues/3713).
fn optimal_intra_op_threads() -> usize {
    let total_cores = num_cpus::get();

    #[cfg(target_os = "windows")]
    let optimal = std::cmp::min(6, total_cores).max(1);

    #[cfg(not(target_os = "windows"))]
    let optimal = total_cores.max(1);

    debug!("CPU threads: {} total cores, using {} for inference", total_cores, optimal);
    optimal
}

/// One compiled-in execution provider candidate
#[allow(dead_code)]
struct Candidate {
    name: &'static str,
    provider: fn() -> ExecutionProviderDispatch,
    /// DirectML needs sequential execution, no memory pattern and Level1 graphs
    conservative: bool,
}

/// Accelerated providers in order of preference. Only providers enabled via
/// Cargo features are listed; CPU is always the final fallback.
fn accelerated_candidates() -> Vec<Candidate> {
    #[allow(unused_mut)]
    let mut candidates = Vec::new();

    #[cfg(feature = "tensorrt")]
    candidates.push(Candidate {
        name: "TensorRT",
        provider: || TensorRTExecutionProvider::default().build(),
        conservative: false,
    });

    #[cfg(feature = "cuda")]
    candidates.push(Candidate {
        name: "CUDA",
        provider: || CUDAExecutionProvider::default().build(),
        conservative: false,
    });

    #[cfg(all(target_os = "macos", feature = "coreml"))]
    candidates.push(Candidate {
        name: "CoreML",
        provider: || CoreMLExecutionProvider::default().build(),
        conservative: false,
    });

    #[cfg(all(target_os = "windows", feature = "directml"))]
    candidates.push(Candidate {
        name: "DirectML",
        provider: || DirectMLExecutionProvider::default().build(),
        conservative: true,
    });

    #[cfg(feature = "openvino")]
    candidates.push(Candidate {
        name: "OpenVINO",
        provider: || OpenVINOExecutionProvider::default().with_device_type("CPU").build(),
        conservative: false,
    });

    #[cfg(feature = "xnnpack")]
    candidates.push(Candidate {
        name: "XNNPACK",
        provider: || XNNPACKExecutionProvider::default().build(),
        conservative: false,
    });

    candidates
}

fn commit_with(
    provider: ExecutionProviderDispatch,
    conservative: bool,
    model_bytes: &[u8],
) -> ort::Result<Session> {
    let mut builder = Session::builder()?.with_execution_providers([provider])?;

    builder = if conservative {
        builder
            .with_parallel_execution(false)?
            .with_memory_pattern(false)?
            .with_optimization_level(GraphOptimizationLevel::Level1)?
    } else {
        builder.with_optimization_level(GraphOptimizationLevel::Level3)?
    };

    builder
        .with_intra_threads(optimal_intra_op_threads())?
        .with_inter_threads(1)?
        .commit_from_memory(model_bytes)
}

fn commit_cpu(model_bytes: &[u8], model_name: &str) -> Result<Session> {
    let size_mb = model_bytes.len() as f64 / 1_048_576.0;
    commit_with(CPUExecutionProvider::default().build(), false, model_bytes).with_context(|| {
        format!(
            "Failed to load {} ONNX model ({:.1} MB). \
            This usually indicates a corrupt model file, an ONNX Runtime \
            version mismatch or an unsupported opset",
            model_name, size_mb
        )
    })
}

/// Build a session for the model at `model_path`.
///
/// `forced_backend` (from `INFERENCE_BACKEND`) pins one provider by name;
/// `None`, empty or `"auto"` tries every compiled-in accelerator in order
/// and falls back to CPU.
///
/// Returns `(backend_name, session)`.
pub fn build_session(
    model_path: &Path,
    model_name: &str,
    forced_backend: Option<&str>,
) -> Result<(String, Session)> {
    if !model_path.exists() {
        anyhow::bail!(
            "{} model not found at: {}",
            model_name,
            model_path.display()
        );
    }

    let model_bytes = std::fs::read(model_path)
        .with_context(|| format!("Failed to read {} model from {}", model_name, model_path.display()))?;

    info!(
        "Loading {} model from {} ({:.1} MB)",
        model_name,
        model_path.display(),
        model_bytes.len() as f64 / 1_048_576.0
    );

    match forced_backend.map(str::to_lowercase).as_deref() {
        None | Some("") | Some("auto") => build_with_acceleration(&model_bytes, model_name),
        Some(backend) => build_forced(backend, &model_bytes, model_name),
    }
}

fn build_with_acceleration(model_bytes: &[u8], model_name: &str) -> Result<(String, Session)> {
    for candidate in accelerated_candidates() {
        match commit_with((candidate.provider)(), candidate.conservative, model_bytes) {
            Ok(session) => {
                info!("✓ Using {} acceleration for {}", candidate.name, model_name);
                return Ok((candidate.name.to_string(), session));
            }
            Err(e) => debug!("{} unavailable for {}: {}", candidate.name, model_name, e),
        }
    }

    let session = commit_cpu(model_bytes, model_name)?;
    warn!("⚠️  Using CPU-only inference for {} (no GPU acceleration available)", model_name);
    Ok(("CPU".to_string(), session))
}

fn build_forced(backend: &str, model_bytes: &[u8], model_name: &str) -> Result<(String, Session)> {
    info!("INFERENCE_BACKEND={}, forcing specific backend for {}", backend, model_name);

    if backend == "cpu" {
        let session = commit_cpu(model_bytes, model_name)?;
        info!("✓ Forced CPU backend for {}", model_name);
        return Ok(("CPU".to_string(), session));
    }

    let candidate = accelerated_candidates()
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(backend));

    match candidate {
        Some(candidate) => {
            let session = commit_with((candidate.provider)(), candidate.conservative, model_bytes)
                .with_context(|| format!("Failed to load {} with {}", model_name, candidate.name))?;
            info!("✓ Forced {} backend for {}", candidate.name, model_name);
            Ok((candidate.name.to_string(), session))
        }
        None => {
            warn!(
                "Unknown or disabled backend '{}', falling back to auto-detection for {}",
                backend, model_name
            );
            build_with_acceleration(model_bytes, model_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_reported() {
        let err = build_session(Path::new("/nonexistent/model.onnx"), "inpainting", None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("inpainting model not found"));
    }

    #[test]
    fn test_thread_count_is_positive() {
        assert!(optimal_intra_op_threads() >= 1);
    }
}
