//! facegate-core — Face registration and matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition, both
//! running via ONNX Runtime on the CPU, plus the persisted member registry
//! and the live matching loop built on top of them.

pub mod alignment;
pub mod detector;
pub mod pipeline;
pub mod recognizer;
pub mod registry;
pub mod session;
pub mod types;

pub use detector::FaceDetector;
pub use pipeline::{FaceEmbedder, FacePipeline, PipelineError};
pub use recognizer::FaceRecognizer;
pub use registry::{member_name_from_path, Member, Registry, RegistryError};
pub use session::{FrameSource, MatchOutcome, MatchSession, SessionError, DEFAULT_SIMILARITY_THRESHOLD};
pub use types::{BoundingBox, Embedding, FirstMatch, MatchResult, Matcher};

use std::path::PathBuf;

/// Per-user data directory: `$XDG_DATA_HOME/facegate`, falling back to
/// `~/.local/share/facegate`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate")
}

/// Directory the ONNX models are expected in unless configured otherwise.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
