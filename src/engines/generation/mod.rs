pub mod cma_es;
pub mod evolution_engine;
pub mod progress;

pub use cma_es::{CmaParameters, OptimizerState};
pub use evolution_engine::{EvolutionEngine, Phase, ProgressCallback, RunSummary};
pub use progress::{ChannelProgressCallback, GenerationReport, LogProgressCallback, ProgressMessage};
