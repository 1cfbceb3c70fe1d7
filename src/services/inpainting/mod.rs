// Inpainting model: LaMa-style ONNX network taking an image and a binary mask
//
// Inputs are `[1, 3, H, W]` and `[1, 1, H, W]` float tensors in [0, 1] with
// H and W multiples of the pad stride; the output is `[1, 3, H, W]` in [0, 1].

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

use crate::core::types::ChannelOrder;
use crate::processing::tensor_codec::tensor_from_raw;
use crate::services::onnx_builder::build_session;

/// Anything that can fill masked regions of a normalized image tensor
pub trait InpaintModel: Send + Sync {
    /// Channel order expected for the image input and produced in the output
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    fn inpaint(&self, image: Array4<f32>, mask: Array4<f32>) -> Result<Array4<f32>>;
}

/// ONNX LaMa inpainter. Runs are serialized through the session mutex.
pub struct LamaInpainter {
    session: Mutex<Session>,
    backend: String,
    image_input: String,
    mask_input: String,
    output: String,
}

impl LamaInpainter {
    pub fn new(model_path: &Path, forced_backend: Option<&str>) -> Result<Self> {
        let (backend, session) = build_session(model_path, "inpainting", forced_backend)?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        if input_names.len() < 2 {
            anyhow::bail!(
                "Inpainting model must take image and mask inputs, found {:?}",
                input_names
            );
        }
        let output = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .context("Inpainting model declares no outputs")?;

        // Prefer the conventional names, otherwise positional (image, mask)
        let image_input = input_names
            .iter()
            .find(|n| n.as_str() == "image")
            .unwrap_or(&input_names[0])
            .clone();
        let mask_input = input_names
            .iter()
            .find(|n| n.as_str() == "mask")
            .unwrap_or(&input_names[1])
            .clone();

        info!(
            "Inpainting model ready on {} (inputs: {}, {}; output: {})",
            backend, image_input, mask_input, output
        );

        Ok(Self {
            session: Mutex::new(session),
            backend,
            image_input,
            mask_input,
            output,
        })
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }
}

fn to_ort_tensor(array: Array4<f32>) -> Result<Tensor<f32>> {
    let shape: [usize; 4] = array
        .shape()
        .try_into()
        .context("Tensor must have 4 dimensions")?;
    let (data, _offset) = array.into_raw_vec_and_offset();
    Ok(Tensor::from_array((shape, data))?)
}

impl InpaintModel for LamaInpainter {
    fn inpaint(&self, image: Array4<f32>, mask: Array4<f32>) -> Result<Array4<f32>> {
        debug!("Running inpainting on tensor {:?}", image.shape());

        let image_value = to_ort_tensor(image.as_standard_layout().into_owned())?;
        let mask_value = to_ort_tensor(mask.as_standard_layout().into_owned())?;

        // Copy the output out while the session is held
        let (dims, data) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![
                self.image_input.as_str() => image_value,
                self.mask_input.as_str() => mask_value
            ])?;

            let (shape, data) = outputs[self.output.as_str()].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, data.to_vec())
        };

        Ok(tensor_from_raw(&dims, data)?)
    }
}
