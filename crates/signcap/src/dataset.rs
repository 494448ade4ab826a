//! On-disk storage of keypoint samples.
//!
//! Every sample is one NumPy `.npy` file holding a 1-D `f64` array, at a path determined entirely by
//! its [`SampleKey`]:
//!
//! ```text
//! <root>/<label>/<sequence>/<frame>.npy
//! ```
//!
//! Sequence and frame indices are written in decimal without padding. There is no index file;
//! writing a sample twice replaces the earlier file.

use std::{
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context};
use itertools::iproduct;
use ndarray::Array1;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};

use crate::keypoints::KeypointVector;

const EXTENSION: &str = "npy";

/// Identifies one sample: the `frame`th frame of recording `sequence` of gesture `label`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub label: String,
    pub sequence: u32,
    pub frame: u32,
}

impl SampleKey {
    pub fn new(label: impl Into<String>, sequence: u32, frame: u32) -> Self {
        Self {
            label: label.into(),
            sequence,
            frame,
        }
    }
}

impl fmt::Display for SampleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.label, self.sequence, self.frame)
    }
}

/// Checks that `label` can be used as a single directory name.
pub fn check_label(label: &str) -> anyhow::Result<()> {
    let mut components = Path::new(label).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == label => Ok(()),
        _ if label.is_empty() => bail!("empty label"),
        _ => bail!("label '{}' is not a plain directory name", label),
    }
}

/// A dataset rooted at a directory.
#[derive(Debug, Clone)]
pub struct Dataset {
    root: PathBuf,
}

impl Dataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding the frames of one recording.
    pub fn sequence_dir(&self, label: &str, sequence: u32) -> PathBuf {
        self.root.join(label).join(sequence.to_string())
    }

    pub fn sample_path(&self, key: &SampleKey) -> PathBuf {
        self.sequence_dir(&key.label, key.sequence)
            .join(format!("{}.{}", key.frame, EXTENSION))
    }

    /// Creates the directory of every sequence of every label, unless it already exists.
    ///
    /// Any failure other than the directory already existing (eg. a file in its place, or missing
    /// permissions) is returned.
    pub fn prepare<S: AsRef<str>>(&self, labels: &[S], sequences: u32) -> anyhow::Result<()> {
        for (label, sequence) in iproduct!(labels, 0..sequences) {
            let dir = self.sequence_dir(label.as_ref(), sequence);
            // `create_dir_all` succeeds if `dir` is already a directory, and fails if anything
            // else is in its way.
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
        }
        log::debug!(
            "prepared {} sequence directories under '{}'",
            labels.len() * sequences as usize,
            self.root.display()
        );
        Ok(())
    }

    /// Stores a sample, replacing any previous sample with the same key.
    ///
    /// The data is written to a temporary file next to the destination and renamed into place,
    /// so the sample file either holds a complete vector or does not exist.
    pub fn write(&self, key: &SampleKey, vector: &KeypointVector) -> anyhow::Result<PathBuf> {
        let path = self.sample_path(key);
        let tmp = path.with_extension(format!("{}.partial", EXTENSION));

        let result = write_npy(&tmp, vector.as_array()).and_then(|()| {
            fs::rename(&tmp, &path).with_context(|| {
                format!(
                    "failed to move '{}' to '{}'",
                    tmp.display(),
                    path.display()
                )
            })
        });
        if result.is_err() {
            fs::remove_file(&tmp).ok();
        }
        result.with_context(|| format!("failed to write sample {}", key))?;

        log::trace!("wrote {}", path.display());
        Ok(path)
    }

    /// Reads a previously written sample.
    pub fn read(&self, key: &SampleKey) -> anyhow::Result<KeypointVector> {
        let path = self.sample_path(key);
        let file =
            File::open(&path).with_context(|| format!("failed to open '{}'", path.display()))?;
        let data = Array1::<f64>::read_npy(BufReader::new(file))
            .with_context(|| format!("failed to read sample '{}'", path.display()))?;
        Ok(data.into())
    }

    /// Checks which samples of a complete capture run exist.
    pub fn audit<S: AsRef<str>>(&self, labels: &[S], sequences: u32, frames: u32) -> Audit {
        let (present, missing): (Vec<_>, Vec<_>) = iproduct!(labels, 0..sequences, 0..frames)
            .map(|(label, sequence, frame)| SampleKey::new(label.as_ref(), sequence, frame))
            .partition(|key| self.sample_path(key).is_file());
        Audit { present, missing }
    }
}

fn write_npy(path: &Path, data: &Array1<f64>) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    data.write_npy(&mut writer)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Result of [`Dataset::audit`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Audit {
    pub present: Vec<SampleKey>,
    pub missing: Vec<SampleKey>,
}

impl Audit {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Number of samples the audited enumeration expects.
    #[inline]
    pub fn expected(&self) -> usize {
        self.present.len() + self.missing.len()
    }
}

impl fmt::Display for Audit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} samples present", self.present.len(), self.expected())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::test::ScratchDir;

    #[test]
    fn paths() {
        let ds = Dataset::new("data_set");
        assert_eq!(
            ds.sample_path(&SampleKey::new("Hamma", 12, 7)),
            Path::new("data_set/Hamma/12/7.npy")
        );
        assert_eq!(ds.sequence_dir("Faqat", 0), Path::new("data_set/Faqat/0"));
    }

    #[test]
    fn labels() {
        check_label("Rahmat").unwrap();
        check_label("thank you").unwrap();
        assert!(check_label("").is_err());
        assert!(check_label("a/b").is_err());
        assert!(check_label("..").is_err());
        assert!(check_label(".").is_err());
        assert!(check_label("/abs").is_err());
    }

    #[test]
    fn prepare_is_idempotent() {
        let dir = ScratchDir::new();
        let ds = Dataset::new(dir.join("root"));
        ds.prepare(&["A", "B"], 2).unwrap();
        ds.prepare(&["A", "B"], 2).unwrap();
        for (label, seq) in iproduct!(["A", "B"], 0..2) {
            assert!(ds.sequence_dir(label, seq).is_dir());
        }
    }

    #[test]
    fn prepare_reports_blocked_path() {
        let dir = ScratchDir::new();
        let ds = Dataset::new(&*dir);
        fs::create_dir(dir.join("A")).unwrap();
        fs::write(dir.join("A").join("1"), b"in the way").unwrap();

        let err = ds.prepare(&["A"], 2).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains(&*ds.sequence_dir("A", 1).to_string_lossy()), "{msg}");
    }

    #[test]
    fn write_read_overwrite() {
        let dir = ScratchDir::new();
        let ds = Dataset::new(&*dir);
        ds.prepare(&["A"], 1).unwrap();

        let key = SampleKey::new("A", 0, 0);
        let path = ds.write(&key, &array![1.0, 0.0, -0.5].into()).unwrap();
        assert_eq!(path, dir.join("A/0/0.npy"));
        assert_eq!(ds.read(&key).unwrap().as_array(), &array![1.0, 0.0, -0.5]);

        ds.write(&key, &array![2.0].into()).unwrap();
        assert_eq!(ds.read(&key).unwrap().as_array(), &array![2.0]);
        assert_eq!(dir.files(), ["A/0/0.npy"]);
    }

    #[test]
    fn npy_header() {
        let dir = ScratchDir::new();
        let ds = Dataset::new(&*dir);
        ds.prepare(&["A"], 1).unwrap();
        let path = ds
            .write(&SampleKey::new("A", 0, 3), &Array1::from_elem(1662, 0.25).into())
            .unwrap();

        let bytes = fs::read(path).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        let header = String::from_utf8_lossy(&bytes[..bytes.len() - 1662 * 8]);
        assert!(header.contains("(1662,)"), "{header}");
        assert!(header.contains("<f8"), "{header}");
        assert_eq!(&bytes[bytes.len() - 8..], 0.25f64.to_le_bytes());
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = ScratchDir::new();
        let ds = Dataset::new(&*dir);
        let err = ds
            .write(&SampleKey::new("A", 0, 0), &array![1.0].into())
            .unwrap_err();
        assert!(format!("{:#}", err).contains("A/0/0"));
        assert!(dir.files().is_empty());
    }

    #[test]
    fn audit() {
        let dir = ScratchDir::new();
        let ds = Dataset::new(&*dir);
        ds.prepare(&["A", "B"], 1).unwrap();
        ds.write(&SampleKey::new("A", 0, 0), &array![1.0].into())
            .unwrap();
        ds.write(&SampleKey::new("B", 0, 1), &array![1.0].into())
            .unwrap();

        let audit = ds.audit(&["A", "B"], 1, 2);
        assert_eq!(
            audit.present,
            [SampleKey::new("A", 0, 0), SampleKey::new("B", 0, 1)]
        );
        assert_eq!(
            audit.missing,
            [SampleKey::new("A", 0, 1), SampleKey::new("B", 0, 0)]
        );
        assert!(!audit.is_complete());
        assert_eq!(audit.to_string(), "2/4 samples present");
    }
}
