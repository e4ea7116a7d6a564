pub mod journal;
pub mod manifest;
pub mod leaderboard;

pub use journal::{header, staging_path, CheckpointReader, CheckpointWriter};
pub use manifest::{manifest_path, RunManifest};
pub use leaderboard::Leaderboard;
