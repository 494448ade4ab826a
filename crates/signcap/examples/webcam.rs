//! Shows the webcam image, to check camera selection and framing before a recording.

use std::time::Duration;

use signcap::{
    capture::{FrameSource, KeyEvent, Preview},
    config::CaptureConfig,
    gui::GuiPreview,
    timer::FpsCounter,
    video::webcam::Webcam,
};

#[signcap::main]
fn main() -> anyhow::Result<()> {
    let config = CaptureConfig::discover(None)?;
    let mut webcam = Webcam::open(&config.webcam)?;
    let mut preview = GuiPreview::open(webcam.name().to_string())?;
    let mut fps = FpsCounter::new("webcam");
    loop {
        let mut image = webcam.next_frame()?;
        if config.mirror {
            image.flip_horizontal_in_place();
        }
        fps.tick_with(webcam.timers());

        preview.show(&image)?;
        if let Some(KeyEvent::Closed) = preview.poll_key(Duration::ZERO) {
            return Ok(());
        }
    }
}
