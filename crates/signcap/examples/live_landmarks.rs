//! Runs the configured landmark estimator on the webcam image and draws its output, without
//! recording anything.

use std::{path::PathBuf, time::Duration};

use signcap::{
    capture::{FrameSource, KeyEvent, Preview},
    config::CaptureConfig,
    gui::GuiPreview,
    holistic::{sidecar::SidecarDetector, BodyPart, Detector},
    image::draw,
    timer::FpsCounter,
    video::webcam::Webcam,
};

#[signcap::main]
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = CaptureConfig::discover(config_path.as_deref())?;
    let mut webcam = Webcam::open(&config.webcam)?;
    let mut detector = SidecarDetector::spawn(&config.detector_command, config.thresholds)?;
    let mut preview = GuiPreview::open("landmarks")?;

    let mut fps = FpsCounter::new("landmarks");
    loop {
        let mut image = webcam.next_frame()?;
        if config.mirror {
            image.flip_horizontal_in_place();
        }
        let result = detector.detect(&image)?;
        result.draw(&mut image);

        let detected = BodyPart::ALL
            .iter()
            .map(|&part| match result.get(part) {
                Some(lms) => format!("{part}: {}", lms.len()),
                None => format!("{part}: -"),
            })
            .collect::<Vec<_>>()
            .join("  ");
        draw::text(&mut image, 5, 12, &detected);

        fps.tick_with(webcam.timers().chain(detector.timers()));

        preview.show(&image)?;
        match preview.poll_key(Duration::ZERO) {
            Some(KeyEvent::Closed) => return Ok(()),
            Some(KeyEvent::Char(c)) if c == config.abort_key => return Ok(()),
            _ => {}
        }
    }
}
