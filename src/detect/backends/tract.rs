#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use super::ssd::{nhwc_input, SsdSlots};
use crate::detect::backend::PersonClassifier;
use crate::detect::result::{PersonScan, DEFAULT_PERSON_THRESHOLD};
use crate::frame::Frame;

type SsdPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based person classifier for an SSD detection model exported to ONNX.
///
/// The model takes a `[1, H, W, 3]` f32 input in `[-1, 1]` and produces
/// post-processed outputs in order: boxes `[1, N, 4]`, classes `[1, N]`,
/// scores `[1, N]`. The model is loaded and optimised once; every call reuses
/// the same plan.
pub struct TractPersonClassifier {
    model: SsdPlan,
    width: u32,
    height: u32,
    threshold: f32,
}

impl TractPersonClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(anyhow!(
                "person detection model not found at {}",
                model_path.display()
            ));
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded person detection model {} ({}x{})",
            model_path.display(),
            width,
            height
        );

        Ok(Self {
            model,
            width,
            height,
            threshold: DEFAULT_PERSON_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let data = nhwc_input(frame, self.width, self.height);
        let input = tract_ndarray::Array4::from_shape_vec(
            (1, self.height as usize, self.width as usize, 3),
            data,
        )
        .context("shape model input")?;
        Ok(input.into_tensor())
    }

    fn decode_outputs(&self, outputs: &TVec<TValue>) -> Result<SsdSlots> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "model produced {} outputs; expected boxes, classes and scores",
                outputs.len()
            ));
        }
        let flat = |index: usize, label: &str| -> Result<Vec<f32>> {
            let view = outputs[index]
                .to_array_view::<f32>()
                .with_context(|| format!("{} output tensor was not f32", label))?;
            Ok(view.iter().copied().collect())
        };
        let boxes = flat(0, "boxes")?;
        let classes = flat(1, "classes")?;
        let scores = flat(2, "scores")?;
        SsdSlots::from_flat(&boxes, &classes, &scores)
    }
}

impl PersonClassifier for TractPersonClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect_person(&mut self, frame: &Frame) -> Result<PersonScan> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let slots = self.decode_outputs(&outputs)?;
        Ok(PersonScan::from_slots(
            &slots.boxes,
            &slots.classes,
            &slots.scores,
            self.threshold,
        ))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::from_rgb(
            self.width,
            self.height,
            vec![0u8; self.width as usize * self.height as usize * 3],
        )?;
        self.detect_person(&blank).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_a_construction_error() {
        let err = TractPersonClassifier::new("/nonexistent/detect.onnx", 300, 300)
            .err()
            .expect("missing model must fail");
        assert!(err.to_string().contains("not found"));
    }
}
