pub mod driver;

pub use driver::CaptureDriver;
