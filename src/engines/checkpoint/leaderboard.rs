use super::journal::CheckpointReader;
use crate::error::{EvoError, Result};
use crate::types::CheckpointRecord;

/// Snapshot of a checkpoint log taken by one read.
#[derive(Debug, Clone, Default)]
pub struct Leaderboard {
    records: Vec<CheckpointRecord>,
}

impl Leaderboard {
    pub fn new(records: Vec<CheckpointRecord>) -> Self {
        Self { records }
    }

    pub fn load(reader: &CheckpointReader) -> Result<Self> {
        Ok(Self::new(reader.read_all()?))
    }

    pub fn records(&self) -> &[CheckpointRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recently appended record.
    pub fn latest(&self) -> Option<&CheckpointRecord> {
        self.records.last()
    }

    pub fn find(&self, generation: u64) -> Result<&CheckpointRecord> {
        // Generations strictly increase down the log.
        self.records
            .binary_search_by_key(&generation, |r| r.generation)
            .map(|i| &self.records[i])
            .map_err(|_| EvoError::RecordNotFound {
                generation,
                available: self.records.len(),
            })
    }

    /// Generation in which the genome logged at `generation` was evaluated.
    ///
    /// Under the running-best policy a genome is carried forward unchanged
    /// through later rows; its first appearance is where it was sampled.
    pub fn origin_generation(&self, generation: u64) -> Result<u64> {
        let target = self.find(generation)?;
        Ok(self
            .records
            .iter()
            .take_while(|r| r.generation <= generation)
            .find(|r| r.genome == target.genome)
            .map(|r| r.generation)
            .unwrap_or(generation))
    }

    /// Highest fitness in the log; the later record wins ties.
    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.records
            .iter()
            .fold(None, |best: Option<&CheckpointRecord>, r| match best {
                Some(b) if b.fitness > r.fitness => Some(b),
                _ => Some(r),
            })
    }

    /// Up to `n` records ordered by fitness, best first.
    pub fn top(&self, n: usize) -> Vec<&CheckpointRecord> {
        let mut ranked: Vec<&CheckpointRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.generation.cmp(&a.generation))
        });
        ranked.truncate(n);
        ranked
    }
}
