pub mod schema;
pub mod gene_reader;
pub mod genome_codec;

pub use genome_codec::{GenomeCodec, NeuronParameters, SnnParameters};
pub use gene_reader::GeneReader;
pub use schema::{Bounds, GenomeSchema, Segment, SegmentKind};
