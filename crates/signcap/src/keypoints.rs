//! Flattening of holistic detection results into fixed-length keypoint vectors.
//!
//! A keypoint vector is the concatenation of one *slot* per [`BodyPart`], in the order of
//! [`BodyPart::ALL`] (pose, face, left hand, right hand). Each slot holds the landmarks of its part
//! flattened row-major, `x, y, z` (plus `visibility` for slots that carry it) for landmark 0, then
//! landmark 1, and so on. Slots of parts that were not detected are filled with zeros, so every
//! vector produced by one [`KeypointLayout`] has the same length and can be stacked into fixed-shape
//! arrays without padding.

use std::ops::Range;

use anyhow::bail;
use ndarray::{s, Array1, ArrayView1};
use serde::Deserialize;

use crate::holistic::{hand, pose, BodyPart, HolisticResult, FACE_LANDMARKS};

/// Shape of the slot of one body part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotSpec {
    /// Number of landmarks the estimator reports for this part.
    pub points: usize,
    /// Whether each landmark's visibility score is stored after its coordinates.
    ///
    /// Configuration files have to state this explicitly for every slot they override, since it
    /// changes the slot's width.
    pub visibility: bool,
}

impl SlotSpec {
    pub const fn new(points: usize, visibility: bool) -> Self {
        Self { points, visibility }
    }

    /// Number of values stored per landmark (3 or 4).
    #[inline]
    pub const fn values_per_point(&self) -> usize {
        if self.visibility {
            4
        } else {
            3
        }
    }

    /// Number of values in this slot.
    #[inline]
    pub const fn width(&self) -> usize {
        self.points * self.values_per_point()
    }
}

/// Slot configuration of a keypoint vector.
///
/// Slot sizes are a property of the landmark estimator in use, so they are configurable. The
/// default is [`KeypointLayout::HOLISTIC`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeypointLayout {
    pub pose: SlotSpec,
    pub face: SlotSpec,
    pub left_hand: SlotSpec,
    pub right_hand: SlotSpec,
}

impl Default for KeypointLayout {
    fn default() -> Self {
        Self::HOLISTIC
    }
}

impl KeypointLayout {
    /// Layout for MediaPipe Holistic-style estimators: 33 pose landmarks with visibility, 468 face
    /// mesh landmarks and 21 landmarks per hand, for a total of 1662 values.
    pub const HOLISTIC: Self = Self {
        pose: SlotSpec::new(pose::NUM_LANDMARKS, true),
        face: SlotSpec::new(FACE_LANDMARKS, false),
        left_hand: SlotSpec::new(hand::NUM_LANDMARKS, false),
        right_hand: SlotSpec::new(hand::NUM_LANDMARKS, false),
    };

    pub fn slot(&self, part: BodyPart) -> SlotSpec {
        match part {
            BodyPart::Pose => self.pose,
            BodyPart::Face => self.face,
            BodyPart::LeftHand => self.left_hand,
            BodyPart::RightHand => self.right_hand,
        }
    }

    /// Total number of values in a keypoint vector.
    pub fn len(&self) -> usize {
        BodyPart::ALL.iter().map(|&part| self.slot(part).width()).sum()
    }

    /// Returns the index range occupied by `part`'s slot.
    pub fn slot_range(&self, part: BodyPart) -> Range<usize> {
        let start = BodyPart::ALL
            .iter()
            .take_while(|&&p| p != part)
            .map(|&p| self.slot(p).width())
            .sum::<usize>();
        start..start + self.slot(part).width()
    }

    /// Checks that every detected landmark set has exactly as many landmarks as its slot.
    ///
    /// A mismatch means that the estimator does not match this layout.
    pub fn validate(&self, result: &HolisticResult) -> anyhow::Result<()> {
        for part in result.detected() {
            let expected = self.slot(part).points;
            let actual = result.get(part).map_or(0, |lms| lms.len());
            if actual != expected {
                bail!(
                    "detector returned {} {} landmarks, but the keypoint layout expects {}",
                    actual,
                    part,
                    expected,
                );
            }
        }
        Ok(())
    }

    /// Encodes a detection result as a keypoint vector.
    ///
    /// This never fails and always returns a vector of [`KeypointLayout::len`] values. Slots of
    /// undetected parts are zero. A landmark set that is larger than its slot is truncated, a
    /// smaller one leaves the remaining values zero (use [`KeypointLayout::validate`] to reject
    /// such results instead). Missing visibility scores are encoded as zero.
    pub fn encode(&self, result: &HolisticResult) -> KeypointVector {
        let mut data = Array1::<f64>::zeros(self.len());
        for part in BodyPart::ALL {
            let Some(landmarks) = result.get(part) else {
                continue;
            };
            let spec = self.slot(part);
            let mut slot = data.slice_mut(s![self.slot_range(part)]);
            for (lm, mut out) in landmarks
                .iter()
                .zip(slot.exact_chunks_mut(spec.values_per_point()))
            {
                out[0] = f64::from(lm.x());
                out[1] = f64::from(lm.y());
                out[2] = f64::from(lm.z());
                if spec.visibility {
                    out[3] = f64::from(lm.visibility().unwrap_or(0.0));
                }
            }
        }
        KeypointVector(data)
    }
}

/// A flattened, fixed-length encoding of one frame's landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointVector(Array1<f64>);

impl KeypointVector {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_array(&self) -> &Array1<f64> {
        &self.0
    }

    #[inline]
    pub fn into_array(self) -> Array1<f64> {
        self.0
    }

    /// Returns the values of `part`'s slot under `layout`.
    ///
    /// # Panics
    ///
    /// Panics if this vector was not produced with `layout`.
    pub fn slot(&self, layout: &KeypointLayout, part: BodyPart) -> ArrayView1<'_, f64> {
        assert_eq!(self.len(), layout.len(), "keypoint vector does not match layout");
        self.0.slice(s![layout.slot_range(part)])
    }
}

impl From<Array1<f64>> for KeypointVector {
    fn from(data: Array1<f64>) -> Self {
        Self(data)
    }
}
