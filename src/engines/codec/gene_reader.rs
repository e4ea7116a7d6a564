use super::schema::Bounds;

/// Consumes genes from a genome front to back.
///
/// Unlike a wrapping consumer, running past the end is a bug in the caller:
/// the schema has already checked the length before reading starts.
pub struct GeneReader<'a> {
    genes: &'a [f64],
    position: usize,
}

impl<'a> GeneReader<'a> {
    pub fn new(genes: &'a [f64]) -> Self {
        Self { genes, position: 0 }
    }

    /// Next gene clamped into `bounds`.
    pub fn next_bounded(&mut self, bounds: Bounds) -> f64 {
        let gene = self.genes[self.position];
        self.position += 1;
        bounds.clamp(gene)
    }

    /// Next `n` genes clamped into `bounds`.
    pub fn take_bounded(&mut self, n: usize, bounds: Bounds) -> Vec<f64> {
        (0..n).map(|_| self.next_bounded(bounds)).collect()
    }

    pub fn has_genes(&self) -> bool {
        self.position < self.genes.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }
}
