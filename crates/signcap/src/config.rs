//! Capture run configuration.
//!
//! Configuration is read from a JSON file. Every field is optional and falls back to its default,
//! so `{}` is a valid configuration file. Example:
//!
//! ```json
//! {
//!     "labels": ["hello", "thanks"],
//!     "sequences": 10,
//!     "dataset_root": "/data/gestures",
//!     "detector_command": ["python3", "python/holistic_sidecar.py"],
//!     "webcam": { "resolution": { "width": 1280, "height": 720 } }
//! }
//! ```

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::dataset::check_label;
use crate::holistic::{sidecar::BUNDLED_ESTIMATOR, Thresholds};
use crate::image::Resolution;
use crate::keypoints::KeypointLayout;

/// Name of the configuration file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "signcap.json";

/// Everything a capture run needs to know.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Gesture labels to record, in recording order. Each label becomes a directory name.
    pub labels: Vec<String>,
    /// Number of recordings per label.
    pub sequences: u32,
    /// Number of frames per recording.
    pub frames: u32,
    pub dataset_root: PathBuf,
    pub thresholds: Thresholds,
    pub layout: KeypointLayout,
    /// Key that stops the run when pressed in the preview window.
    pub abort_key: char,
    /// Length of the pauses at the start and end of every recording, in milliseconds.
    ///
    /// 0 disables the pauses.
    pub pause_ms: u64,
    /// How long to wait for a key press after every frame, in milliseconds.
    pub abort_poll_ms: u64,
    /// Mirror frames horizontally before detection.
    pub mirror: bool,
    /// Draw the detected landmarks onto the preview.
    pub draw_landmarks: bool,
    /// Landmark estimator program and its arguments.
    ///
    /// Defaults to running the bundled MediaPipe Holistic script with `python3`.
    pub detector_command: Vec<String>,
    pub webcam: WebcamConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            labels: ["Rahmat", "Togri", "Birgalikda", "Hamma", "Faqat"]
                .into_iter()
                .map(String::from)
                .collect(),
            sequences: 30,
            frames: 30,
            dataset_root: PathBuf::from("data_set"),
            thresholds: Thresholds::default(),
            layout: KeypointLayout::HOLISTIC,
            abort_key: 'q',
            pause_ms: 3000,
            abort_poll_ms: 10,
            mirror: true,
            draw_landmarks: true,
            detector_command: vec!["python3".into(), BUNDLED_ESTIMATOR.into()],
            webcam: WebcamConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Loads a configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
        log::info!("loaded configuration from '{}'", path.display());
        Ok(config)
    }

    /// Loads the configuration at `path` if given, else [`DEFAULT_CONFIG_FILE`] if it exists,
    /// else returns the default configuration.
    pub fn discover(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => {
                log::info!("no '{}' found, using defaults", DEFAULT_CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }

    /// Checks the configuration for values that would make a capture run fail or produce a
    /// malformed dataset.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.labels.is_empty() {
            bail!("no labels configured");
        }
        let mut seen = HashSet::new();
        for label in &self.labels {
            check_label(label)?;
            if !seen.insert(label.as_str()) {
                bail!("duplicate label '{}'", label);
            }
        }
        if self.sequences == 0 {
            bail!("`sequences` must be at least 1");
        }
        if self.frames == 0 {
            bail!("`frames` must be at least 1");
        }
        if self.webcam.fps == 0 {
            bail!("`webcam.fps` must be at least 1");
        }
        for (name, value) in [
            (
                "min_detection_confidence",
                self.thresholds.min_detection_confidence,
            ),
            (
                "min_tracking_confidence",
                self.thresholds.min_tracking_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("`{}` must be between 0 and 1, got {}", name, value);
            }
        }
        if self.layout.len() == 0 {
            bail!("keypoint layout has no slots");
        }
        Ok(())
    }

    /// Total number of samples a complete run writes.
    pub fn total_samples(&self) -> u64 {
        self.labels.len() as u64 * u64::from(self.sequences) * u64::from(self.frames)
    }

    #[inline]
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    #[inline]
    pub fn abort_poll(&self) -> Duration {
        Duration::from_millis(self.abort_poll_ms)
    }
}

/// Webcam selection and capture mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebcamConfig {
    /// Device name (V4L2 card name). The first compatible device is used if unset.
    pub name: Option<String>,
    /// Frame size to record at. The nearest size the webcam offers is used.
    pub resolution: Resolution,
    /// Frame rate to record at. Modes reaching it are preferred over a closer resolution.
    pub fps: u32,
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            name: None,
            resolution: Resolution::VGA,
            fps: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::ScratchDir;

    #[test]
    fn defaults() {
        let config = CaptureConfig::default();
        config.validate().unwrap();
        assert_eq!(config.labels.len(), 5);
        assert_eq!(config.total_samples(), 5 * 30 * 30);
        assert_eq!(config.pause(), Duration::from_secs(3));
        assert_eq!(config.abort_poll(), Duration::from_millis(10));
        assert_eq!(config.layout.len(), 1662);
        assert_eq!(config.abort_key, 'q');
        assert_eq!(config.detector_command[0], "python3");
        assert!(Path::new(&config.detector_command[1]).is_file());
    }

    #[test]
    fn empty_json_is_default() {
        let config: CaptureConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CaptureConfig::default());
    }

    #[test]
    fn partial_override() {
        let config: CaptureConfig = serde_json::from_str(
            r#"{
                "labels": ["A", "B"],
                "frames": 3,
                "pause_ms": 0,
                "thresholds": { "min_tracking_confidence": 0.75 },
                "layout": { "face": { "points": 478, "visibility": false } },
                "webcam": { "name": "Integrated Camera", "fps": 15 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.labels, ["A", "B"]);
        assert_eq!(config.sequences, 30);
        assert_eq!(config.frames, 3);
        assert_eq!(config.pause(), Duration::ZERO);
        assert_eq!(config.thresholds.min_detection_confidence, 0.5);
        assert_eq!(config.thresholds.min_tracking_confidence, 0.75);
        assert_eq!(config.layout.face.width(), 478 * 3);
        assert_eq!(config.layout.pose, KeypointLayout::HOLISTIC.pose);
        assert_eq!(config.webcam.name.as_deref(), Some("Integrated Camera"));
        assert_eq!(config.webcam.fps, 15);
        assert_eq!(config.webcam.resolution, Resolution::VGA);
    }

    #[test]
    fn slot_overrides_must_state_visibility() {
        assert!(
            serde_json::from_str::<CaptureConfig>(r#"{"layout": {"pose": {"points": 33}}}"#)
                .is_err()
        );

        let config: CaptureConfig = serde_json::from_str(
            r#"{"layout": {"pose": {"points": 33, "visibility": true}}}"#,
        )
        .unwrap();
        assert_eq!(config.layout, KeypointLayout::HOLISTIC);
        assert_eq!(config.layout.len(), 1662);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<CaptureConfig>(r#"{"sequence": 3}"#).is_err());
    }

    #[test]
    fn validation() {
        let invalid = [
            CaptureConfig {
                labels: vec![],
                ..Default::default()
            },
            CaptureConfig {
                labels: vec!["A".into(), "A".into()],
                ..Default::default()
            },
            CaptureConfig {
                labels: vec!["../escape".into()],
                ..Default::default()
            },
            CaptureConfig {
                sequences: 0,
                ..Default::default()
            },
            CaptureConfig {
                frames: 0,
                ..Default::default()
            },
            CaptureConfig {
                webcam: WebcamConfig {
                    fps: 0,
                    ..Default::default()
                },
                ..Default::default()
            },
            CaptureConfig {
                thresholds: Thresholds {
                    min_detection_confidence: 1.5,
                    min_tracking_confidence: 0.5,
                },
                ..Default::default()
            },
        ];
        for config in invalid {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn load_file() {
        let dir = ScratchDir::new();
        let path = dir.join("signcap.json");
        fs::write(&path, r#"{"sequences": 2, "detector_command": ["estimator", "--gpu"]}"#)
            .unwrap();
        let config = CaptureConfig::discover(Some(&path)).unwrap();
        assert_eq!(config.sequences, 2);
        assert_eq!(config.detector_command, ["estimator", "--gpu"]);

        fs::write(&path, "{").unwrap();
        let err = CaptureConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config file"), "{err}");

        assert!(CaptureConfig::load(&dir.join("missing.json")).is_err());
    }
}
