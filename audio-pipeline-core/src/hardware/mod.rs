//! Hardware-side implementations of [`AudioInterface`](crate::traits::audio_interface::AudioInterface)
//! that ship with the core crate.

pub mod simulated;

pub use simulated::SimulatedInterface;
