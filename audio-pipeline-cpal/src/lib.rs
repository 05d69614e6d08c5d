//! # audio-pipeline-cpal
//!
//! Host audio backend for audio-pipeline-core, built on cpal.
//!
//! Provides:
//! - `CpalInput`: `AudioInterface` over a cpal input device (default or by name)
//! - `list_input_devices`: input device enumeration on the default host
//! - `pcm`: float to little-endian integer PCM conversion used by the callback
//!
//! `CpalInput` and `list_input_devices` are compiled only with the `cpal`
//! feature, which links the platform audio libraries (ALSA on Linux).
//!
//! ## Usage
//! ```ignore
//! use audio_pipeline_cpal::CpalInput;
//! use audio_pipeline_core::{CaptureConfiguration, CaptureDriver};
//!
//! let driver = CaptureDriver::new(CaptureConfiguration::default())?;
//! let mut graph = driver.build_graph(CpalInput::default_device(), None)?;
//! let result = driver.run(&mut graph)?;
//! ```

pub mod pcm;

#[cfg(feature = "cpal")]
pub mod cpal_input;
#[cfg(feature = "cpal")]
pub mod device_enumerator;

#[cfg(feature = "cpal")]
pub use cpal_input::CpalInput;
#[cfg(feature = "cpal")]
pub use device_enumerator::list_input_devices;
