pub mod checkpoint;
pub mod codec;
pub mod evaluation;
pub mod generation;
pub mod replay;
