pub mod runner;

pub use runner::{ReplayOutcome, ReplayRunner, ReplayTarget};
