//! Runs capture sessions against a scripted estimator process.

use std::{fs, path::PathBuf, time::Duration};

use signcap::{
    capture::{CaptureLoop, CaptureOutcome, FrameSource, KeyEvent, Preview},
    config::CaptureConfig,
    dataset::{Dataset, SampleKey},
    holistic::{sidecar::SidecarDetector, BodyPart, Detector, Thresholds},
    image::Image,
    keypoints::KeypointLayout,
};

/// Reads the session header, then answers every frame with a fixed left hand.
const HAND_ESTIMATOR: &str = r#"
read hello
pts=""
i=0
while [ $i -lt 21 ]; do pts="$pts[0.5,0.25,-0.125],"; i=$((i+1)); done
while read header; do
    w=${header#*\"width\":}; w=${w%%,*}
    h=$(echo "${header#*\"height\":}" | tr -dc 0-9)
    head -c $((w * h * 3)) > /dev/null
    echo "{\"pose\":null,\"left_hand\":[${pts%,}]}"
done
"#;

const FAILING_ESTIMATOR: &str = r#"
read hello
read header
echo '{"error":"model file missing"}'
"#;

struct Scratch(PathBuf);

impl Scratch {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("signcap-it-{:016x}", fastrand::u64(..)));
        fs::create_dir_all(&path).unwrap();
        Self(path)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.0).ok();
    }
}

struct Blank;

impl FrameSource for Blank {
    fn next_frame(&mut self) -> anyhow::Result<Image> {
        Ok(Image::new(8, 6))
    }
}

struct Headless;

impl Preview for Headless {
    fn show(&mut self, _image: &Image) -> anyhow::Result<()> {
        Ok(())
    }

    fn poll_key(&mut self, _timeout: Duration) -> Option<KeyEvent> {
        None
    }

    fn close(&mut self) {}
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn config(root: PathBuf) -> CaptureConfig {
    CaptureConfig {
        labels: vec!["Hamma".into()],
        sequences: 1,
        frames: 2,
        dataset_root: root,
        pause_ms: 0,
        abort_poll_ms: 0,
        ..Default::default()
    }
}

#[test]
fn detect_over_pipe() {
    let mut detector = SidecarDetector::spawn(&sh(HAND_ESTIMATOR), Thresholds::default()).unwrap();
    for _ in 0..3 {
        let result = detector.detect(&Image::new(4, 4)).unwrap();
        assert_eq!(result.detected().collect::<Vec<_>>(), [BodyPart::LeftHand]);
        let hand = result.left_hand().unwrap();
        assert_eq!(hand.len(), 21);
        assert_eq!(hand.get(20).position(), [0.5, 0.25, -0.125]);
    }
}

#[test]
fn capture_with_sidecar() {
    let dir = Scratch::new();
    let config = config(dir.0.join("data_set"));
    let detector = SidecarDetector::spawn(&sh(HAND_ESTIMATOR), config.thresholds).unwrap();

    let summary = CaptureLoop::new(config.clone(), Blank, detector, Headless)
        .run()
        .unwrap();
    assert_eq!(summary.written, 2);
    assert_eq!(summary.outcome, CaptureOutcome::Completed);

    let layout = KeypointLayout::HOLISTIC;
    let ds = Dataset::new(&config.dataset_root);
    for frame in 0..2 {
        let sample = ds.read(&SampleKey::new("Hamma", 0, frame)).unwrap();
        assert_eq!(sample.len(), 1662);
        let hand = sample.slot(&layout, BodyPart::LeftHand);
        assert_eq!(
            hand.iter().copied().take(6).collect::<Vec<_>>(),
            [0.5, 0.25, -0.125, 0.5, 0.25, -0.125]
        );
        for part in [BodyPart::Pose, BodyPart::Face, BodyPart::RightHand] {
            assert!(sample.slot(&layout, part).iter().all(|&v| v == 0.0));
        }
    }
    assert!(dir.0.join("data_set/Hamma/0/1.npy").is_file());
}

#[test]
fn estimator_error_aborts_capture() {
    let dir = Scratch::new();
    let config = config(dir.0.join("data_set"));
    let detector = SidecarDetector::spawn(&sh(FAILING_ESTIMATOR), config.thresholds).unwrap();

    let err = CaptureLoop::new(config.clone(), Blank, detector, Headless)
        .run()
        .unwrap_err();
    assert!(format!("{:#}", err).contains("model file missing"), "{err:#}");
    assert!(!dir.0.join("data_set/Hamma/0/0.npy").exists());
}

#[test]
fn estimator_exit_is_an_error() {
    let mut detector = SidecarDetector::spawn(&sh("read hello"), Thresholds::default()).unwrap();
    assert!(detector.detect(&Image::new(2, 2)).is_err());
}

#[test]
fn missing_program() {
    let command = vec!["signcap-no-such-estimator".to_string()];
    assert!(SidecarDetector::spawn(&command, Thresholds::default()).is_err());
    assert!(SidecarDetector::spawn(&[], Thresholds::default()).is_err());
}
