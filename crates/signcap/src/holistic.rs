//! Holistic landmark detection: body pose, face and both hands from a single image.
//!
//! The estimator itself is an external collaborator behind the [`Detector`] trait. The
//! [`sidecar`] module provides an implementation that drives an external estimator process.

pub mod hand;
pub mod pose;
pub mod sidecar;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::image::{draw, Color, Image};
use crate::landmark::Landmarks;

/// Number of face mesh landmarks reported by the holistic estimator.
pub const FACE_LANDMARKS: usize = 468;

/// The landmark sets produced by a holistic estimator, in keypoint vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Pose,
    Face,
    LeftHand,
    RightHand,
}

impl BodyPart {
    /// All parts, in the order their slots appear in a keypoint vector.
    pub const ALL: [BodyPart; 4] = [Self::Pose, Self::Face, Self::LeftHand, Self::RightHand];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pose => "pose",
            Self::Face => "face",
            Self::LeftHand => "left hand",
            Self::RightHand => "right hand",
        }
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detection result for one image.
///
/// Every landmark set is independently optional: a set is [`None`] when the estimator did not find
/// that body part in the image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolisticResult {
    pose: Option<Landmarks>,
    face: Option<Landmarks>,
    left_hand: Option<Landmarks>,
    right_hand: Option<Landmarks>,
}

impl HolisticResult {
    /// Creates an empty result where nothing was detected.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part: BodyPart, landmarks: Landmarks) -> Self {
        self.set(part, Some(landmarks));
        self
    }

    pub fn get(&self, part: BodyPart) -> Option<&Landmarks> {
        match part {
            BodyPart::Pose => self.pose.as_ref(),
            BodyPart::Face => self.face.as_ref(),
            BodyPart::LeftHand => self.left_hand.as_ref(),
            BodyPart::RightHand => self.right_hand.as_ref(),
        }
    }

    pub fn set(&mut self, part: BodyPart, landmarks: Option<Landmarks>) {
        let slot = match part {
            BodyPart::Pose => &mut self.pose,
            BodyPart::Face => &mut self.face,
            BodyPart::LeftHand => &mut self.left_hand,
            BodyPart::RightHand => &mut self.right_hand,
        };
        *slot = landmarks;
    }

    #[inline]
    pub fn pose(&self) -> Option<&Landmarks> {
        self.pose.as_ref()
    }

    #[inline]
    pub fn face(&self) -> Option<&Landmarks> {
        self.face.as_ref()
    }

    #[inline]
    pub fn left_hand(&self) -> Option<&Landmarks> {
        self.left_hand.as_ref()
    }

    #[inline]
    pub fn right_hand(&self) -> Option<&Landmarks> {
        self.right_hand.as_ref()
    }

    /// Returns the parts that were detected.
    pub fn detected(&self) -> impl Iterator<Item = BodyPart> + '_ {
        BodyPart::ALL
            .into_iter()
            .filter(|part| self.get(*part).is_some())
    }

    /// Draws all detected landmark sets onto `image`.
    ///
    /// Landmark coordinates are expected to be normalized to the image size.
    pub fn draw(&self, image: &mut Image) {
        if let Some(face) = &self.face {
            draw_landmarks(image, face, &[], &FACE_STYLE);
        }
        if let Some(pose) = &self.pose {
            let connections = pose::CONNECTIVITY
                .iter()
                .map(|&(a, b)| (a as usize, b as usize))
                .collect::<Vec<_>>();
            draw_landmarks(image, pose, &connections, &POSE_STYLE);
        }
        let connections = hand::CONNECTIVITY
            .iter()
            .map(|&(a, b)| (a as usize, b as usize))
            .collect::<Vec<_>>();
        if let Some(hand) = &self.left_hand {
            draw_landmarks(image, hand, &connections, &LEFT_HAND_STYLE);
        }
        if let Some(hand) = &self.right_hand {
            draw_landmarks(image, hand, &connections, &RIGHT_HAND_STYLE);
        }
    }
}

struct Style {
    landmark: Color,
    connection: Color,
    thickness: u32,
    diameter: u32,
}

const FACE_STYLE: Style = Style {
    landmark: Color::from_rgb8(255, 0, 0),
    connection: Color::from_rgb8(0, 255, 255),
    thickness: 1,
    diameter: 1,
};

const POSE_STYLE: Style = Style {
    landmark: Color::from_rgb8(255, 0, 0),
    connection: Color::from_rgb8(0, 255, 255),
    thickness: 2,
    diameter: 7,
};

const LEFT_HAND_STYLE: Style = Style {
    landmark: Color::from_rgb8(255, 0, 255),
    connection: Color::from_rgb8(255, 255, 0),
    thickness: 3,
    diameter: 5,
};

const RIGHT_HAND_STYLE: Style = Style {
    landmark: Color::from_rgb8(128, 128, 0),
    connection: Color::from_rgb8(128, 0, 128),
    thickness: 3,
    diameter: 5,
};

fn draw_landmarks(
    image: &mut Image,
    landmarks: &Landmarks,
    connections: &[(usize, usize)],
    style: &Style,
) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    // Occluded landmarks are extrapolated a bit beyond the frame. Points further out than one
    // frame size (or NaN) are not drawn at all.
    let to_px = |[x, y, _]: [f32; 3]| {
        let visible = -1.0..=2.0;
        (visible.contains(&x) && visible.contains(&y))
            .then(|| ((x * w).round() as i32, (y * h).round() as i32))
    };

    let pixels = landmarks
        .iter()
        .map(|lm| to_px(lm.position()))
        .collect::<Vec<_>>();
    for &(a, b) in connections {
        let (Some(&Some((ax, ay))), Some(&Some((bx, by)))) = (pixels.get(a), pixels.get(b)) else {
            continue;
        };
        draw::line(image, ax, ay, bx, by)
            .color(style.connection)
            .stroke_width(style.thickness);
    }
    for (x, y) in pixels.into_iter().flatten() {
        if style.diameter <= 1 {
            if (0..image.width() as i32).contains(&x) && (0..image.height() as i32).contains(&y) {
                image.set(x as u32, y as u32, style.landmark);
            }
            continue;
        }
        draw::circle(image, x, y, style.diameter)
            .color(style.landmark)
            .stroke_width(style.thickness);
    }
}

/// Confidence thresholds handed to the landmark estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum confidence for a body part to be reported when it was not tracked in the previous
    /// frame.
    pub min_detection_confidence: f32,
    /// Minimum confidence for an already-detected body part to keep being tracked across frames.
    pub min_tracking_confidence: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

/// A holistic landmark estimator session.
///
/// Sessions are stateful (they track body parts across frames) and must be fed consecutive frames
/// of the same video. The session is released when the detector is dropped.
pub trait Detector {
    /// Estimates landmarks on `image`.
    ///
    /// Body parts that are not found are reported as absent, which is not an error. Errors indicate
    /// a broken estimator session.
    fn detect(&mut self, image: &Image) -> anyhow::Result<HolisticResult>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, image: &Image) -> anyhow::Result<HolisticResult> {
        (**self).detect(image)
    }
}
