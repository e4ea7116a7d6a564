use crate::config::ControllerConfig;
use serde::{Deserialize, Serialize};

/// Closed interval a parameter is kept inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.center();
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn center(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    Weight,
    Bias,
}

/// A contiguous run of genome positions sharing one meaning and one bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub kind: SegmentKind,
    pub offset: usize,
    pub len: usize,
    pub bounds: Bounds,
}

/// Fixed genome layout for a two-layer spiking controller.
///
/// Each neuron contributes its input weights followed by its bias
/// (firing threshold). Hidden neurons come first, then output neurons.
/// The layout is a pure function of the architecture, so a genome stored
/// today decodes the same way as long as the architecture is unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeSchema {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
    pub weight_bounds: Bounds,
    pub bias_bounds: Bounds,
    segments: Vec<Segment>,
}

impl GenomeSchema {
    pub fn new(
        inputs: usize,
        hidden: usize,
        outputs: usize,
        weight_bounds: Bounds,
        bias_bounds: Bounds,
    ) -> Self {
        let mut segments = Vec::with_capacity(2 * (hidden + outputs));
        let mut offset = 0;

        let layers = [("hidden", hidden, inputs), ("output", outputs, hidden)];
        for (layer, neurons, fan_in) in layers {
            for neuron in 0..neurons {
                segments.push(Segment {
                    name: format!("{}[{}].weights", layer, neuron),
                    kind: SegmentKind::Weight,
                    offset,
                    len: fan_in,
                    bounds: weight_bounds,
                });
                offset += fan_in;
                segments.push(Segment {
                    name: format!("{}[{}].bias", layer, neuron),
                    kind: SegmentKind::Bias,
                    offset,
                    len: 1,
                    bounds: bias_bounds,
                });
                offset += 1;
            }
        }

        Self {
            inputs,
            hidden,
            outputs,
            weight_bounds,
            bias_bounds,
            segments,
        }
    }

    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.inputs,
            config.hidden,
            config.outputs,
            Bounds::new(config.weight_min, config.weight_max),
            Bounds::new(config.bias_min, config.bias_max),
        )
    }

    /// Number of genome positions.
    pub fn len(&self) -> usize {
        self.hidden * (self.inputs + 1) + self.outputs * (self.hidden + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Bounds for every genome position, in order.
    pub fn position_bounds(&self) -> Vec<Bounds> {
        self.segments
            .iter()
            .flat_map(|s| std::iter::repeat(s.bounds).take(s.len))
            .collect()
    }

    /// Centre of every position's bounds.
    pub fn center(&self) -> Vec<f64> {
        self.position_bounds().iter().map(Bounds::center).collect()
    }

    /// Stable identifier of the layout, stored alongside checkpoint logs.
    pub fn fingerprint(&self) -> String {
        format!(
            "snn:{}-{}-{}:w[{},{}]:b[{},{}]",
            self.inputs,
            self.hidden,
            self.outputs,
            self.weight_bounds.min,
            self.weight_bounds.max,
            self.bias_bounds.min,
            self.bias_bounds.max
        )
    }
}
