//! Landmarks reported by the estimator.
//!
//! Coordinates are normalized: `x` and `y` are fractions of the frame width and height, `z` is a
//! depth on roughly the same scale as `x`. Points outside `0.0..=1.0` are extrapolated from what
//! is visible.

type Position = [f32; 3];

/// One landmark set, such as the 21 points of a hand, in the estimator's order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Landmarks {
    points: Box<[Landmark]>,
}

impl Landmarks {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn get(&self, index: usize) -> Landmark {
        self.points[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        self.points.iter().copied()
    }
}

impl FromIterator<Landmark> for Landmarks {
    fn from_iter<T: IntoIterator<Item = Landmark>>(iter: T) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// A single point, with the estimator's visibility score if it reports one for this set.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Landmark {
    pos: Position,
    visibility: Option<f32>,
}

impl Landmark {
    pub fn new(pos: Position) -> Self {
        Self {
            pos,
            visibility: None,
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Likelihood (`0.0..=1.0`) that the point is not occluded. MediaPipe only reports this for
    /// pose landmarks.
    #[inline]
    pub fn visibility(&self) -> Option<f32> {
        self.visibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect() {
        let lms = (0..4)
            .map(|i| Landmark::new([i as f32, 0.5, -0.5]))
            .collect::<Landmarks>();
        assert_eq!(lms.len(), 4);
        assert!(!lms.is_empty());
        assert_eq!(lms.get(3).x(), 3.0);
        assert_eq!(lms.get(3).position(), [3.0, 0.5, -0.5]);
        assert_eq!(lms.iter().map(|lm| lm.y()).sum::<f32>(), 2.0);
        assert!(Landmarks::default().is_empty());
    }

    #[test]
    fn visibility_is_per_point() {
        let lms: Landmarks = [
            Landmark::new([0.0; 3]).with_visibility(0.75),
            Landmark::new([1.0; 3]),
        ]
        .into_iter()
        .collect();
        assert_eq!(lms.get(0).visibility(), Some(0.75));
        assert_eq!(lms.get(1).visibility(), None);
        assert_eq!(lms.get(1).z(), 1.0);
    }
}
