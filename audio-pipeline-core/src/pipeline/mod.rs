pub mod encoder_stage;
pub mod graph;
pub mod sink;
pub mod source;
pub mod stage;

pub use encoder_stage::EncoderStage;
pub use graph::PipelineGraph;
pub use sink::SinkStage;
pub use source::SourceStage;
pub use stage::{Flow, ReadOutcome, Stage, StageIo, StageRole};
