pub mod audio_interface;
pub mod destination;
pub mod observer;
