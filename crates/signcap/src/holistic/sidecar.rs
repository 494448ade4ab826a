//! A [`Detector`] backed by an external landmark estimator process.
//!
//! The estimator runs as a child process and talks to us over its stdin and stdout:
//!
//! 1. After spawning, we write one JSON line with the [`Thresholds`]:
//!    `{"min_detection_confidence":0.5,"min_tracking_confidence":0.5}`
//! 2. For every frame we write a JSON header line `{"width":W,"height":H}`, followed by `W*H*3`
//!    bytes of tightly packed RGB pixel data.
//! 3. The estimator answers each frame with one JSON line:
//!    `{"pose":[[x,y,z,visibility],...],"face":[[x,y,z],...],"left_hand":[...],"right_hand":[...]}`
//!    where undetected parts are `null` or missing, or `{"error":"message"}` if estimation failed.
//!
//! Closing stdin ends the session. The process inherits our stderr, so its diagnostics end up next
//! to ours.
//!
//! [`BUNDLED_ESTIMATOR`] implements this protocol on top of MediaPipe Holistic.

use std::{
    io::{self, BufRead, BufReader, BufWriter, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::holistic::{BodyPart, Detector, HolisticResult, Thresholds};
use crate::image::Image;
use crate::landmark::{Landmark, Landmarks};
use crate::timer::Timer;

/// Path of the MediaPipe Holistic estimator script shipped in this crate's `python` directory.
pub const BUNDLED_ESTIMATOR: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/python/holistic_sidecar.py");

/// Drives an external landmark estimator process.
///
/// The process is killed (if it did not already exit) when the detector is dropped.
pub struct SidecarDetector {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    line: String,
    t_roundtrip: Timer,
}

impl SidecarDetector {
    /// Spawns the estimator process and starts a session with the given thresholds.
    ///
    /// `command` is the program followed by its arguments.
    pub fn spawn(command: &[String], thresholds: Thresholds) -> anyhow::Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("no detector command configured");
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn detector process `{}`", program))?;
        log::info!("spawned detector `{}` (pid {})", program, child.id());

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            bail!("detector process has no stdio pipes");
        };

        let mut this = Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            line: String::new(),
            t_roundtrip: Timer::new("detect"),
        };
        let stdin = this.stdin.as_mut().context("detector session has been closed")?;
        write_hello(stdin, &thresholds).context("failed to start detector session")?;
        Ok(this)
    }

    /// Returns the profiling timer measuring detector round trips.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_roundtrip].into_iter()
    }
}

impl Detector for SidecarDetector {
    fn detect(&mut self, image: &Image) -> anyhow::Result<HolisticResult> {
        let _guard = self.t_roundtrip.start();
        let stdin = self.stdin.as_mut().context("detector session has been closed")?;
        write_frame(stdin, image).context("failed to send frame to detector")?;
        read_response(&mut self.stdout, &mut self.line)
    }
}

impl Drop for SidecarDetector {
    fn drop(&mut self) {
        // Closing stdin tells a well-behaved estimator to exit.
        drop(self.stdin.take());

        match self.child.try_wait() {
            Ok(Some(status)) => log::debug!("detector exited with {}", status),
            Ok(None) => {
                if let Err(e) = self.child.kill() {
                    log::warn!("failed to kill detector process: {}", e);
                }
                match self.child.wait() {
                    Ok(status) => log::debug!("detector terminated ({})", status),
                    Err(e) => log::warn!("failed to reap detector process: {}", e),
                }
            }
            Err(e) => log::warn!("failed to query detector process status: {}", e),
        }
    }
}

#[derive(Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct Response {
    pose: Option<Vec<Vec<f32>>>,
    face: Option<Vec<Vec<f32>>>,
    left_hand: Option<Vec<Vec<f32>>>,
    right_hand: Option<Vec<Vec<f32>>>,
    error: Option<String>,
}

fn write_hello<W: Write>(w: &mut W, thresholds: &Thresholds) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *w, thresholds)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}

fn write_frame<W: Write>(w: &mut W, image: &Image) -> anyhow::Result<()> {
    let header = FrameHeader {
        width: image.width(),
        height: image.height(),
    };
    serde_json::to_writer(&mut *w, &header)?;
    w.write_all(b"\n")?;
    w.write_all(&image.to_rgb8())?;
    w.flush()?;
    Ok(())
}

fn read_response<R: BufRead>(r: &mut R, line: &mut String) -> anyhow::Result<HolisticResult> {
    line.clear();
    if r.read_line(line)? == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof))
            .context("detector process closed its output");
    }
    log::trace!("detector response: {} bytes", line.len());

    let response: Response =
        serde_json::from_str(line.trim_end()).context("malformed detector response")?;
    if let Some(msg) = response.error {
        bail!("detector reported an error: {}", msg);
    }

    let mut result = HolisticResult::new();
    for (part, points) in [
        (BodyPart::Pose, response.pose),
        (BodyPart::Face, response.face),
        (BodyPart::LeftHand, response.left_hand),
        (BodyPart::RightHand, response.right_hand),
    ] {
        if let Some(points) = points {
            result.set(part, Some(parse_landmarks(part, &points)?));
        }
    }
    Ok(result)
}

fn parse_landmarks(part: BodyPart, points: &[Vec<f32>]) -> anyhow::Result<Landmarks> {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| match point[..] {
            [x, y, z] => Ok(Landmark::new([x, y, z])),
            [x, y, z, visibility] => Ok(Landmark::new([x, y, z]).with_visibility(visibility)),
            _ => bail!(
                "{} landmark {} has {} components (expected 3 or 4)",
                part,
                i,
                point.len()
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::image::{Color, Resolution};

    fn parse(s: &str) -> anyhow::Result<HolisticResult> {
        read_response(&mut Cursor::new(s.as_bytes()), &mut String::new())
    }

    #[test]
    fn hello() {
        let mut out = Vec::new();
        write_hello(
            &mut out,
            &Thresholds {
                min_detection_confidence: 0.25,
                min_tracking_confidence: 0.75,
            },
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"min_detection_confidence\":0.25,\"min_tracking_confidence\":0.75}\n"
        );
    }

    #[test]
    fn frame() {
        let mut image = Image::from_rgba8(Resolution::new(2, 1), &[0; 8]);
        image.set(0, 0, Color::from_rgb8(1, 2, 3));
        image.set(1, 0, Color::from_rgb8(4, 5, 6));

        let mut out = Vec::new();
        write_frame(&mut out, &image).unwrap();
        let header = b"{\"width\":2,\"height\":1}\n";
        assert_eq!(&out[..header.len()], header);
        assert_eq!(&out[header.len()..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn response() {
        let res = parse(
            r#"{"pose":[[0.1,0.2,0.3,0.9],[0.4,0.5,0.6,0.8]],"face":null,"right_hand":[[1,2,3]]}"#,
        )
        .unwrap();

        let pose = res.pose().unwrap();
        assert_eq!(pose.len(), 2);
        assert_eq!(pose.get(1).position(), [0.4, 0.5, 0.6]);
        assert_eq!(pose.get(0).visibility(), Some(0.9));
        assert!(res.face().is_none());
        assert!(res.left_hand().is_none());
        assert_eq!(res.right_hand().unwrap().get(0).position(), [1.0, 2.0, 3.0]);
        assert_eq!(res.right_hand().unwrap().get(0).visibility(), None);
    }

    #[test]
    fn empty_response() {
        let res = parse("{}\n").unwrap();
        assert_eq!(res, HolisticResult::new());
    }

    #[test]
    fn consecutive_responses() {
        let mut input = Cursor::new(&b"{\"face\":[[0,0,0]]}\n{\"left_hand\":[[1,1,1]]}\n"[..]);
        let mut line = String::new();
        let first = read_response(&mut input, &mut line).unwrap();
        let second = read_response(&mut input, &mut line).unwrap();
        assert_eq!(first.detected().collect::<Vec<_>>(), [BodyPart::Face]);
        assert_eq!(second.detected().collect::<Vec<_>>(), [BodyPart::LeftHand]);
        assert!(read_response(&mut input, &mut line).is_err());
    }

    #[test]
    fn errors() {
        let err = parse("{\"error\":\"model not found\"}\n").unwrap_err();
        assert!(err.to_string().contains("model not found"));

        assert!(parse("").is_err());
        assert!(parse("not json\n").is_err());

        let err = parse("{\"left_hand\":[[1,2]]}\n").unwrap_err();
        assert!(err.to_string().contains("left hand landmark 0"));
    }
}
