use super::evolution_engine::ProgressCallback;
use crate::types::CheckpointRecord;
use std::sync::mpsc::Sender;

/// What one finished generation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: u64,
    /// Best fitness among this generation's candidates.
    pub generation_best: f64,
    /// Row appended to the checkpoint log.
    pub logged: CheckpointRecord,
    pub failures: usize,
    pub population_size: usize,
    pub sigma: f64,
}

/// Reports progress through the `log` facade.
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: u64) {
        log::debug!("Generation {} starting", generation);
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        log::info!(
            "Generation {} complete. Best: {:.4}, logged: {:.4}, failures: {}/{}, sigma: {:.4e}",
            report.generation,
            report.generation_best,
            report.logged.fitness,
            report.failures,
            report.population_size,
            report.sigma
        );
    }

    fn on_individual_evaluated(&mut self, index: usize, total: usize, fitness: f64) {
        log::trace!("  Evaluated {}/{}: {:.4}", index, total, fitness);
    }
}

// For embedding the search in another thread or process.
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(u64),
    GenerationComplete(GenerationReport),
    IndividualEvaluated { index: usize, total: usize, fitness: f64 },
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: u64) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, report: &GenerationReport) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationComplete(report.clone()));
    }

    fn on_individual_evaluated(&mut self, index: usize, total: usize, fitness: f64) {
        let _ = self.sender.send(ProgressMessage::IndividualEvaluated {
            index,
            total,
            fitness,
        });
    }
}
