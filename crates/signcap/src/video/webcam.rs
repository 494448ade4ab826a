//! V4L2 webcam capture.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices delivering JFIF JPEG or Motion JPEG frames are supported.

use std::{cmp::Reverse, env};

use anyhow::{bail, Context};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::capture::FrameSource;
use crate::config::WebcamConfig;
use crate::image::{Image, Resolution};
use crate::timer::Timer;

const ENV_VAR_WEBCAM_NAME: &str = "SIGNCAP_WEBCAM_NAME";

/// A frame size and rate offered by a webcam.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Mode {
    resolution: Resolution,
    interval: Fract,
}

impl Mode {
    fn fps(&self) -> f32 {
        1.0 / self.interval.as_f32()
    }
}

/// Picks the capture mode to record with.
///
/// Pauses and sequence lengths are counted in frames, so modes reaching `fps` always win over
/// slower ones. Among those, the mode whose pixel count is closest to `resolution` is picked, and
/// the higher frame rate breaks ties.
fn pick_mode(modes: &[Mode], resolution: Resolution, fps: u32) -> Option<Mode> {
    modes.iter().copied().min_by_key(|mode| {
        let too_slow = mode.fps().round() < fps as f32;
        let distance = mode.resolution.num_pixels().abs_diff(resolution.num_pixels());
        let millihertz = (mode.fps() * 1000.0) as u32;
        (too_slow, distance, Reverse(millihertz))
    })
}

/// Returns the first compressed pixel format `device` supports.
fn jpeg_format(device: &Device) -> anyhow::Result<Option<PixelFormat>> {
    for desc in device.formats(BufType::VIDEO_CAPTURE) {
        let format = desc?.pixel_format();
        if format == PixelFormat::MJPG || format == PixelFormat::JPEG {
            return Ok(Some(format));
        }
    }
    Ok(None)
}

/// Lists the discrete modes of `format`.
///
/// Devices describing their sizes or rates as ranges yield no modes.
fn list_modes(device: &Device, format: PixelFormat) -> anyhow::Result<Vec<Mode>> {
    let FrameSizes::Discrete(sizes) = device.frame_sizes(format)? else {
        return Ok(Vec::new());
    };
    let mut modes = Vec::new();
    for size in sizes {
        let resolution = Resolution::new(size.width(), size.height());
        let FrameIntervals::Discrete(intervals) =
            device.frame_intervals(format, size.width(), size.height())?
        else {
            continue;
        };
        for interval in intervals {
            modes.push(Mode {
                resolution,
                interval: *interval.fract(),
            });
        }
    }
    Ok(modes)
}

/// A webcam delivering decoded [`Image`]s.
///
/// The device is released when the [`Webcam`] is dropped.
pub struct Webcam {
    stream: ReadStream,
    card: String,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the webcam selected by `config`.
    ///
    /// If `config` does not name a device, the `SIGNCAP_WEBCAM_NAME` environment variable is
    /// consulted. If that is unset too, the first device delivering JPEG frames is opened.
    ///
    /// This can block for hundreds of milliseconds while the webcam initializes.
    pub fn open(config: &WebcamConfig) -> anyhow::Result<Self> {
        let env_name = env::var(ENV_VAR_WEBCAM_NAME).ok();
        let wanted = config.name.as_deref().or(env_name.as_deref());
        if let (None, Some(name)) = (&config.name, &env_name) {
            log::debug!("using webcam '{}' from `{}`", name, ENV_VAR_WEBCAM_NAME);
        }

        for res in linuxvideo::list().context("failed to enumerate video devices")? {
            match res {
                Ok(dev) => match Self::open_device(dev, wanted, config) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::debug!("skipping device: {:#}", e),
                },
                Err(e) => log::warn!("{}", e),
            }
        }

        match wanted {
            Some(name) => bail!("webcam '{}' not found or not supported", name),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_device(
        dev: Device,
        wanted: Option<&str>,
        config: &WebcamConfig,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        let card = caps.card();
        if wanted.map_or(false, |name| name != card)
            || !caps
                .device_capabilities()
                .contains(CapabilityFlags::VIDEO_CAPTURE)
        {
            return Ok(None);
        }
        let path = dev.path()?;

        let Some(pixel_format) = jpeg_format(&dev)? else {
            log::debug!("{} ({}) does not deliver JPEG frames", card, path.display());
            return Ok(None);
        };

        // Drivers that only describe ranges of sizes and rates get the configured mode requested
        // as is and pick the nearest one they support.
        let modes = list_modes(&dev, pixel_format)?;
        let mode = pick_mode(&modes, config.resolution, config.fps).unwrap_or(Mode {
            resolution: config.resolution,
            interval: Fract::new(1, config.fps),
        });
        log::debug!(
            "{} offers {} modes, requesting {} @ {:.1}Hz",
            card,
            modes.len(),
            mode.resolution,
            mode.fps(),
        );

        let capture = dev.video_capture(PixFormat::new(
            mode.resolution.width(),
            mode.resolution.height(),
            pixel_format,
        ))?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let interval = capture.set_frame_interval(mode.interval)?;
        let fps = 1.0 / interval.as_f32();
        if fps.round() < config.fps as f32 {
            log::warn!(
                "{} records at {:.1}Hz, below the configured {}Hz",
                card,
                fps,
                config.fps
            );
        }
        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            card,
            path.display(),
            resolution,
            fps,
        );

        Ok(Some(Self {
            stream: capture
                .into_stream()
                .context("failed to start webcam stream")?,
            card: card.to_string(),
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Name of the opened device.
    #[inline]
    pub fn name(&self) -> &str {
        &self.card
    }

    /// Negotiated frame size.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads and decodes the next frame, blocking until one is available.
    ///
    /// Webcams occasionally deliver corrupted MJPG frames. Those are reported as errors rather
    /// than replaced, so that no made-up frame ends up in a recording.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let t_decode = &self.t_decode;
        let decoded = self
            .stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                Ok(t_decode.time(|| Image::decode_jpeg(&buf)))
            })
            .context("failed to read frame from webcam")?;
        decoded.context("webcam delivered a corrupted frame")
    }

    /// Returns profiling timers for frame capture and decoding.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_dequeue, &self.t_decode].into_iter()
    }
}

impl FrameSource for Webcam {
    fn next_frame(&mut self) -> anyhow::Result<Image> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u32, height: u32, fps: u32) -> Mode {
        Mode {
            resolution: Resolution::new(width, height),
            interval: Fract::new(1, fps),
        }
    }

    #[test]
    fn exact_mode() {
        let modes = [mode(1280, 720, 30), mode(640, 480, 30), mode(320, 240, 30)];
        assert_eq!(
            pick_mode(&modes, Resolution::VGA, 30),
            Some(mode(640, 480, 30))
        );
    }

    #[test]
    fn frame_rate_beats_resolution() {
        let modes = [mode(640, 480, 15), mode(1280, 720, 30), mode(1920, 1080, 30)];
        assert_eq!(
            pick_mode(&modes, Resolution::VGA, 30),
            Some(mode(1280, 720, 30))
        );
    }

    #[test]
    fn faster_mode_breaks_ties() {
        let modes = [mode(640, 480, 30), mode(640, 480, 60)];
        assert_eq!(
            pick_mode(&modes, Resolution::VGA, 30),
            Some(mode(640, 480, 60))
        );
    }

    #[test]
    fn slow_webcam() {
        let modes = [mode(1280, 720, 10), mode(640, 480, 15)];
        assert_eq!(
            pick_mode(&modes, Resolution::VGA, 30),
            Some(mode(640, 480, 15))
        );
        assert_eq!(pick_mode(&[], Resolution::VGA, 30), None);
    }
}
