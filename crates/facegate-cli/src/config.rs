use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, loaded from environment variables and then
/// overridden by command-line flags.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the member registry file.
    pub registry_path: PathBuf,
    /// Cosine similarity a live face must exceed to match a member.
    pub similarity_threshold: f32,
    /// Frames to discard after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    /// Requested capture width.
    pub frame_width: u32,
    /// Requested capture height.
    pub frame_height: u32,
}

/// Flags that take precedence over the environment.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Camera device to capture from [env: FACEGATE_CAMERA_DEVICE]
    #[arg(long, global = true)]
    pub camera: Option<String>,
    /// Member registry file [env: FACEGATE_REGISTRY_PATH]
    #[arg(long, global = true)]
    pub registry: Option<PathBuf>,
    /// Directory holding det_10g.onnx and w600k_r50.onnx [env: FACEGATE_MODEL_DIR]
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,
    /// Similarity threshold for a match [env: FACEGATE_SIMILARITY_THRESHOLD]
    #[arg(long, global = true)]
    pub threshold: Option<f32>,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            camera_device: var("FACEGATE_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: var("FACEGATE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facegate_core::default_model_dir),
            registry_path: var("FACEGATE_REGISTRY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| facegate_core::default_data_dir().join("members.json")),
            similarity_threshold: parse_var(&var, "FACEGATE_SIMILARITY_THRESHOLD")
                .unwrap_or(facegate_core::DEFAULT_SIMILARITY_THRESHOLD),
            warmup_frames: parse_var(&var, "FACEGATE_WARMUP_FRAMES").unwrap_or(4),
            frame_width: parse_var(&var, "FACEGATE_FRAME_WIDTH").unwrap_or(640),
            frame_height: parse_var(&var, "FACEGATE_FRAME_HEIGHT").unwrap_or(480),
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(camera) = overrides.camera {
            self.camera_device = camera;
        }
        if let Some(registry) = overrides.registry {
            self.registry_path = registry;
        }
        if let Some(model_dir) = overrides.model_dir {
            self.model_dir = model_dir;
        }
        if let Some(threshold) = overrides.threshold {
            self.similarity_threshold = threshold;
        }
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.warmup_frames, 4);
        assert_eq!((config.frame_width, config.frame_height), (640, 480));
        assert!(config.registry_path.ends_with("facegate/members.json"));
        assert!(config.model_dir.ends_with("facegate/models"));
    }

    #[test]
    fn test_env_values() {
        let config = Config::from_lookup(lookup(&[
            ("FACEGATE_CAMERA_DEVICE", "/dev/video4"),
            ("FACEGATE_REGISTRY_PATH", "face_data.json"),
            ("FACEGATE_SIMILARITY_THRESHOLD", " 0.55 "),
            ("FACEGATE_WARMUP_FRAMES", "0"),
        ]));
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.registry_path, PathBuf::from("face_data.json"));
        assert_eq!(config.similarity_threshold, 0.55);
        assert_eq!(config.warmup_frames, 0);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("FACEGATE_SIMILARITY_THRESHOLD", "high"),
            ("FACEGATE_FRAME_WIDTH", "-1"),
        ]));
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.frame_width, 640);
    }

    #[test]
    fn test_flags_override_env() {
        let mut config = Config::from_lookup(lookup(&[("FACEGATE_CAMERA_DEVICE", "/dev/video4")]));
        config.apply(Overrides {
            camera: Some("/dev/video2".into()),
            threshold: Some(0.8),
            ..Overrides::default()
        });
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.warmup_frames, 4);
    }
}
