pub mod metadata;
pub mod writer;
