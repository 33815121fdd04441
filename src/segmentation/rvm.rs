use super::preprocess::Preprocessor;
use super::types::{Mask, SegmentationModel};
use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// Recurrent hidden states carried between frames.
struct HiddenStates {
    r1: Array4<f32>,
    r2: Array4<f32>,
    r3: Array4<f32>,
    r4: Array4<f32>,
}

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
    states: Option<HiddenStates>,

    // Downsample ratio for hidden states
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512
    /// - Downsample ratio: 0.25 (hidden states are 1/4 of input resolution)
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            states: None,
            downsample_ratio: 0.25,
        })
    }

    fn initial_states(&self) -> HiddenStates {
        let h = (self.height as f32 * self.downsample_ratio) as usize;
        let w = (self.width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        HiddenStates {
            r1: Array4::zeros((1, 16, h, w)),
            r2: Array4::zeros((1, 20, h / 2, w / 2)),
            r3: Array4::zeros((1, 24, h / 4, w / 4)),
            r4: Array4::zeros((1, 28, h / 8, w / 8)),
        }
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let states = match self.states.take() {
            Some(states) => states,
            None => self.initial_states(),
        };

        let input_tensor = self.preprocessor.preprocess(frame);

        // RVM expects: src (frame), r1, r2, r3, r4
        // Outputs: fgr, pha, r1, r2, r3, r4
        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(&input_tensor)?,
                TensorRef::from_array_view(&states.r1)?,
                TensorRef::from_array_view(&states.r2)?,
                TensorRef::from_array_view(&states.r3)?,
                TensorRef::from_array_view(&states.r4)?,
            ])
            .context("Failed to run inference")?;

        let next_state = |index: usize| -> Result<Array4<f32>> {
            Ok(outputs[index]
                .try_extract_array::<f32>()?
                .to_owned()
                .into_dimensionality::<Ix4>()?)
        };
        self.states = Some(HiddenStates {
            r1: next_state(2)?,
            r2: next_state(3)?,
            r3: next_state(4)?,
            r4: next_state(5)?,
        });

        let pha = outputs[1].try_extract_array::<f32>()?;
        let (frame_width, frame_height) = frame.dimensions();
        Preprocessor::postprocess(pha, frame_width, frame_height)
    }

    fn name(&self) -> &str {
        "rvm"
    }
}
