//! Landmark dataset capture for gesture and sign-language classifiers.
//!
//! `signcap` records a webcam, runs a holistic (pose, face and hands) landmark estimator on every
//! frame, and stores each frame's landmarks as one fixed-length keypoint vector. Samples are
//! indexed by gesture label, recording sequence and frame:
//!
//! ```text
//! <dataset root>/<label>/<sequence>/<frame>.npy
//! ```
//!
//! The main pieces are:
//!
//! * [`keypoints`]: the [`KeypointLayout`][keypoints::KeypointLayout] that turns a
//!   [`HolisticResult`][holistic::HolisticResult] into a [`KeypointVector`][keypoints::KeypointVector].
//! * [`dataset`]: sample naming, directory preparation and atomic `.npy` storage.
//! * [`capture`]: the capture loop tying a frame source, a detector and a preview together.
//!
//! # Coordinates
//!
//! Landmark coordinates follow the convention of the external estimator: X and Y are normalized
//! to the input image (`0.0..=1.0`, Y pointing *down*), Z is relative depth.
//!
//! # Environment Variables
//!
//! * `SIGNCAP_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name. If unset, the first device that supports a compatible image format will be used.
//! * `RUST_LOG`: Overrides the log filters installed by [`init_logger!`].
//!
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;

pub mod capture;
pub mod config;
pub mod dataset;
pub mod gui;
pub mod holistic;
pub mod image;
pub mod keypoints;
pub mod landmark;
pub mod timer;
pub mod video;

#[cfg(test)]
mod test;

pub use signcap_macros::main;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `signcap` will log at *debug* level, everything else at *info*.
///
/// `wgpu` will always log at *warn* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
