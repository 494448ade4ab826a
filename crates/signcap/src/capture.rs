//! The capture loop.
//!
//! A capture run walks every frame of every sequence of every label, in that nesting order. For
//! each frame it grabs an image from a [`FrameSource`], runs the [`Detector`] on it, shows the
//! annotated image in a [`Preview`] and stores the frame's [`KeypointVector`] in the [`Dataset`].
//!
//! The first and last frame of every sequence are bracketed by pauses that give the recorded
//! person time to get into position, with a banner naming the label and sequence (see
//! [`SequenceStage`]). Pressing the abort key or closing the preview window stops the run.
//!
//! [`KeypointVector`]: crate::keypoints::KeypointVector

use std::time::{Duration, Instant};

use anyhow::Context;
use itertools::iproduct;

use crate::config::CaptureConfig;
use crate::dataset::{Dataset, SampleKey};
use crate::holistic::Detector;
use crate::image::{draw, Color, Image};
use crate::timer::{FpsCounter, Timer};

/// A source of video frames, such as a webcam.
///
/// The underlying device is released when the source is dropped.
pub trait FrameSource {
    /// Returns the next frame, blocking until it is available.
    fn next_frame(&mut self) -> anyhow::Result<Image>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> anyhow::Result<Image> {
        (**self).next_frame()
    }
}

/// Input reported by a [`Preview`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// A character was typed.
    Char(char),
    /// The preview was closed by the user.
    Closed,
}

/// A window displaying the frames as they are captured.
pub trait Preview {
    fn show(&mut self, image: &Image) -> anyhow::Result<()>;

    /// Waits up to `timeout` for a key press.
    ///
    /// Returns as soon as an event arrives, or [`None`] if none did.
    fn poll_key(&mut self, timeout: Duration) -> Option<KeyEvent>;

    /// Closes the preview. Further calls to [`Preview::show`] are ignored.
    fn close(&mut self);
}

impl<P: Preview + ?Sized> Preview for Box<P> {
    fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        (**self).show(image)
    }

    fn poll_key(&mut self, timeout: Duration) -> Option<KeyEvent> {
        (**self).poll_key(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Banner color announcing the start of a sequence.
const START_COLOR: Color = Color::from_rgb8(0, 0, 255);
/// Banner color announcing the end of a sequence.
const END_COLOR: Color = Color::from_rgb8(255, 0, 0);
const BANNER_POS: (i32, i32) = (15, 20);

/// Position of a frame within its sequence, which determines the guidance shown for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStage {
    /// First frame: pause, show the start banner, pause again.
    Start,
    /// Any frame between the first and last: live preview only.
    Mid,
    /// Last frame: show the live frame, then the end banner, then pause.
    End,
    /// The only frame of a one-frame sequence: the start stage followed by the end banner.
    Single,
}

impl SequenceStage {
    /// Returns the stage of frame `frame` of a sequence that is `frames` long.
    pub fn of(frame: u32, frames: u32) -> Self {
        let last = frames.saturating_sub(1);
        match (frame == 0, frame == last) {
            (true, true) => Self::Single,
            (true, false) => Self::Start,
            (false, true) => Self::End,
            (false, false) => Self::Mid,
        }
    }

    #[inline]
    pub fn is_first(self) -> bool {
        matches!(self, Self::Start | Self::Single)
    }

    #[inline]
    pub fn is_last(self) -> bool {
        matches!(self, Self::End | Self::Single)
    }
}

/// How a capture run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Every sample was written.
    Completed,
    /// The user stopped the run while this frame was being processed.
    ///
    /// The frame's sample was written if the abort was observed after writing it (during the
    /// per-frame key poll), and not written if it was observed during a pause before the write.
    Aborted {
        label: String,
        sequence: u32,
        frame: u32,
    },
}

/// Result of [`CaptureLoop::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Number of samples written.
    pub written: u64,
    pub outcome: CaptureOutcome,
}

impl CaptureSummary {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.outcome == CaptureOutcome::Completed
    }
}

/// Drives a capture run.
///
/// The frame source, detector and preview are owned by the loop. They are released when the loop
/// is dropped, which [`CaptureLoop::run`] does on every exit path.
pub struct CaptureLoop<S: FrameSource, D: Detector, P: Preview> {
    config: CaptureConfig,
    dataset: Dataset,
    source: S,
    detector: D,
    preview: P,
    t_read: Timer,
    t_detect: Timer,
    t_write: Timer,
}

impl<S: FrameSource, D: Detector, P: Preview> CaptureLoop<S, D, P> {
    pub fn new(config: CaptureConfig, source: S, detector: D, preview: P) -> Self {
        Self {
            dataset: Dataset::new(&config.dataset_root),
            config,
            source,
            detector,
            preview,
            t_read: Timer::new("read"),
            t_detect: Timer::new("detect"),
            t_write: Timer::new("write"),
        }
    }

    #[inline]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Records the whole dataset, or until the user aborts.
    ///
    /// All sequence directories are created before the first frame is captured. Failing to read
    /// a frame, to run detection or to write a sample ends the run with an error. Samples written
    /// up to that point are kept.
    pub fn run(mut self) -> anyhow::Result<CaptureSummary> {
        self.config.validate()?;
        self.dataset
            .prepare(&self.config.labels, self.config.sequences)?;

        let total = self.config.total_samples();
        log::info!(
            "capturing {} samples into '{}' ({} labels x {} sequences x {} frames)",
            total,
            self.dataset.root().display(),
            self.config.labels.len(),
            self.config.sequences,
            self.config.frames,
        );

        let labels = self.config.labels.clone();
        let mut fps = FpsCounter::new("capture");
        let mut written = 0;
        for (label, sequence, frame) in
            iproduct!(&labels, 0..self.config.sequences, 0..self.config.frames)
        {
            let key = SampleKey::new(label.as_str(), sequence, frame);
            if frame == 0 {
                log::info!(
                    "recording '{}' sequence {}/{}",
                    label,
                    sequence + 1,
                    self.config.sequences,
                );
            }

            let captured = self
                .capture_frame(&key)
                .with_context(|| format!("failed to capture sample {}", key))?;
            if captured {
                written += 1;
            }
            if !captured || self.poll_abort(self.config.abort_poll()) {
                log::info!("capture aborted at {} ({}/{} samples written)", key, written, total);
                return Ok(CaptureSummary {
                    written,
                    outcome: CaptureOutcome::Aborted {
                        label: key.label,
                        sequence,
                        frame,
                    },
                });
            }

            fps.tick_with([&self.t_read, &self.t_detect, &self.t_write]);
        }

        log::info!("capture complete ({} samples written)", written);
        Ok(CaptureSummary {
            written,
            outcome: CaptureOutcome::Completed,
        })
    }

    /// Captures, shows and stores one frame.
    ///
    /// Returns `false` if the user aborted during one of the pauses, before the sample was
    /// written.
    fn capture_frame(&mut self, key: &SampleKey) -> anyhow::Result<bool> {
        let stage = SequenceStage::of(key.frame, self.config.frames);
        let pause = self.config.pause();

        let mut image = self.t_read.time(|| self.source.next_frame())?;
        if self.config.mirror {
            image.flip_horizontal_in_place();
        }

        let result = self.t_detect.time(|| self.detector.detect(&image))?;
        self.config.layout.validate(&result)?;
        if self.config.draw_landmarks {
            result.draw(&mut image);
        }

        let banner = format!("{} {}", key.label, key.sequence);
        if stage.is_first() {
            if self.pause_or_abort(pause) {
                return Ok(false);
            }
            self.show_banner(&image, &banner, START_COLOR)?;
            if self.pause_or_abort(pause) {
                return Ok(false);
            }
        } else {
            self.preview.show(&image)?;
        }
        if stage.is_last() {
            self.show_banner(&image, &banner, END_COLOR)?;
            if self.pause_or_abort(pause) {
                return Ok(false);
            }
        }

        let vector = self.config.layout.encode(&result);
        self.t_write.time(|| self.dataset.write(key, &vector))?;
        Ok(true)
    }

    fn show_banner(&mut self, image: &Image, text: &str, color: Color) -> anyhow::Result<()> {
        let mut image = image.clone();
        draw::text(&mut image, BANNER_POS.0, BANNER_POS.1, text)
            .large()
            .color(color);
        self.preview.show(&image)
    }

    /// Waits for `duration` to pass, or until a key is pressed.
    ///
    /// Returns `true` if the run should be aborted. Any key other than the abort key ends the
    /// pause early.
    fn pause_or_abort(&mut self, duration: Duration) -> bool {
        if duration.is_zero() {
            return false;
        }
        let deadline = Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.preview.poll_key(remaining) {
                Some(event) => return self.is_abort(event),
                None if Instant::now() >= deadline => return false,
                None => {}
            }
        }
    }

    /// Waits up to `timeout` for a key press, then takes every other key that is already queued.
    ///
    /// Keys typed while a frame was being processed pile up, and the abort key may be behind any
    /// number of them.
    fn poll_abort(&mut self, timeout: Duration) -> bool {
        let mut timeout = timeout;
        while let Some(event) = self.preview.poll_key(timeout) {
            if self.is_abort(event) {
                return true;
            }
            timeout = Duration::ZERO;
        }
        false
    }

    fn is_abort(&self, event: KeyEvent) -> bool {
        match event {
            KeyEvent::Char(c) => c == self.config.abort_key,
            KeyEvent::Closed => true,
        }
    }
}

impl<S: FrameSource, D: Detector, P: Preview> Drop for CaptureLoop<S, D, P> {
    fn drop(&mut self) {
        self.preview.close();
    }
}
