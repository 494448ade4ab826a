//! Records a gesture landmark dataset from the webcam.
//!
//! Usage: `signcap [CONFIG.json]`
//!
//! Without an argument, `signcap.json` in the working directory is used if it exists, and the
//! built-in defaults otherwise.

use std::path::PathBuf;

use signcap::{
    capture::{CaptureLoop, CaptureOutcome},
    config::CaptureConfig,
    dataset::Dataset,
    gui::GuiPreview,
    holistic::sidecar::SidecarDetector,
    video::webcam::Webcam,
};

#[signcap::main]
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = CaptureConfig::discover(config_path.as_deref())?;
    config.validate()?;

    let webcam = Webcam::open(&config.webcam)?;
    let detector = SidecarDetector::spawn(&config.detector_command, config.thresholds)?;
    let preview = GuiPreview::open("Data Collection")?;

    let dataset = Dataset::new(&config.dataset_root);
    let (labels, sequences, frames) = (config.labels.clone(), config.sequences, config.frames);

    let summary = CaptureLoop::new(config, webcam, detector, preview).run()?;
    if let CaptureOutcome::Aborted {
        label,
        sequence,
        frame,
    } = &summary.outcome
    {
        log::warn!(
            "stopped at '{}' sequence {} frame {}; rerun to record the missing samples",
            label,
            sequence,
            frame,
        );
    }

    let audit = dataset.audit(&labels, sequences, frames);
    log::info!("{}: {}", dataset.root().display(), audit);
    Ok(())
}
