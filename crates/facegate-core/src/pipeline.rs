//! Detection + recognition glued into a single "image in, embedding out" step.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Anything that can turn an image into a face embedding.
///
/// Returns `Ok(None)` when the image holds no detectable face.
pub trait FaceEmbedder {
    type Error: std::error::Error + Send + Sync + 'static;

    fn embed(&mut self, image: &RgbImage) -> Result<Option<Embedding>, Self::Error>;
}

/// SCRFD detector feeding the ArcFace recognizer.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE).to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE).to_string_lossy())?;
        Ok(Self::new(detector, recognizer))
    }
}

impl FaceEmbedder for FacePipeline {
    type Error = PipelineError;

    /// Embeds the most confident face in the image.
    fn embed(&mut self, image: &RgbImage) -> Result<Option<Embedding>, PipelineError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            return Ok(None);
        };

        tracing::debug!(
            confidence = face.confidence,
            x = face.x,
            y = face.y,
            width = face.width,
            height = face.height,
            others = faces.len() - 1,
            "face detected"
        );

        Ok(Some(self.recognizer.extract(image, face)?))
    }
}
