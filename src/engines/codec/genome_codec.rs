use super::gene_reader::GeneReader;
use super::schema::{Bounds, GenomeSchema};
use crate::error::{EvoError, Result};
use crate::types::Genome;
use serde::{Deserialize, Serialize};

/// Input weights and firing threshold of one spiking neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronParameters {
    pub weights: Vec<f64>,
    pub bias: f64,
}

/// Named view of a genome: the parameters of every controller neuron.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnnParameters {
    pub hidden: Vec<NeuronParameters>,
    pub output: Vec<NeuronParameters>,
}

/// Encodes and decodes genomes against one fixed schema.
#[derive(Debug, Clone)]
pub struct GenomeCodec {
    schema: GenomeSchema,
}

impl GenomeCodec {
    pub fn new(schema: GenomeSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &GenomeSchema {
        &self.schema
    }

    pub fn genome_len(&self) -> usize {
        self.schema.len()
    }

    /// Fails with `SchemaMismatch` when the genome was produced under a
    /// different layout.
    pub fn check_len(&self, genome: &Genome) -> Result<()> {
        if genome.len() != self.schema.len() {
            return Err(EvoError::SchemaMismatch {
                expected: self.schema.len(),
                actual: genome.len(),
            });
        }
        Ok(())
    }

    /// Flattens parameters into a genome, rejecting wrong shapes and
    /// out-of-bounds values.
    pub fn encode(&self, params: &SnnParameters) -> Result<Genome> {
        let schema = &self.schema;
        let mut values = Vec::with_capacity(schema.len());

        let layers = [
            ("hidden", &params.hidden, schema.hidden, schema.inputs),
            ("output", &params.output, schema.outputs, schema.hidden),
        ];
        for (layer, neurons, expected_neurons, fan_in) in layers {
            if neurons.len() != expected_neurons {
                return Err(EvoError::Configuration(format!(
                    "{} layer has {} neurons, schema expects {}",
                    layer,
                    neurons.len(),
                    expected_neurons
                )));
            }
            for (i, neuron) in neurons.iter().enumerate() {
                if neuron.weights.len() != fan_in {
                    return Err(EvoError::Configuration(format!(
                        "{}[{}] has {} weights, schema expects {}",
                        layer,
                        i,
                        neuron.weights.len(),
                        fan_in
                    )));
                }
                check_bounds(layer, i, "weight", &neuron.weights, schema.weight_bounds)?;
                check_bounds(layer, i, "bias", &[neuron.bias], schema.bias_bounds)?;
                values.extend_from_slice(&neuron.weights);
                values.push(neuron.bias);
            }
        }

        Ok(Genome::new(values))
    }

    /// Splits a genome into named parameters, clamping every value into its
    /// segment bounds.
    pub fn decode(&self, genome: &Genome) -> Result<SnnParameters> {
        self.check_len(genome)?;
        let schema = &self.schema;
        let mut reader = GeneReader::new(genome.values());

        let mut read_layer = |neurons: usize, fan_in: usize| -> Vec<NeuronParameters> {
            (0..neurons)
                .map(|_| NeuronParameters {
                    weights: reader.take_bounded(fan_in, schema.weight_bounds),
                    bias: reader.next_bounded(schema.bias_bounds),
                })
                .collect()
        };

        let hidden = read_layer(schema.hidden, schema.inputs);
        let output = read_layer(schema.outputs, schema.hidden);

        Ok(SnnParameters { hidden, output })
    }

    /// Genome with every value clamped into its bounds.
    pub fn clamp(&self, genome: &Genome) -> Result<Genome> {
        let params = self.decode(genome)?;
        self.encode(&params)
    }
}

fn check_bounds(layer: &str, neuron: usize, what: &str, values: &[f64], bounds: Bounds) -> Result<()> {
    if let Some(value) = values.iter().find(|v| !bounds.contains(**v)) {
        return Err(EvoError::Configuration(format!(
            "{}[{}] {} {} outside [{}, {}]",
            layer, neuron, what, value, bounds.min, bounds.max
        )));
    }
    Ok(())
}
