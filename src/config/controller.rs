use super::traits::{invalid, ConfigSection};
use crate::error::EvoError;
use serde::{Deserialize, Serialize};

/// Shape of the spiking controller whose parameters make up the genome.
///
/// Changing any field changes the genome layout, so logs written under one
/// architecture cannot be replayed under another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub inputs: usize,
    pub hidden: usize,
    pub outputs: usize,
    pub weight_min: f64,
    pub weight_max: f64,
    pub bias_min: f64,
    pub bias_max: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            inputs: 4,
            hidden: 2,
            outputs: 8,
            weight_min: -1.0,
            weight_max: 1.0,
            bias_min: 0.0,
            bias_max: 1.0,
        }
    }
}

impl ConfigSection for ControllerConfig {
    fn section_name() -> &'static str {
        "controller"
    }

    fn validate(&self) -> Result<(), EvoError> {
        if self.inputs == 0 || self.hidden == 0 || self.outputs == 0 {
            return Err(invalid(
                Self::section_name(),
                "inputs, hidden and outputs must all be at least 1",
            ));
        }
        if !(self.weight_min < self.weight_max) {
            return Err(invalid(Self::section_name(), "weight_min must be below weight_max"));
        }
        if !(self.bias_min < self.bias_max) {
            return Err(invalid(Self::section_name(), "bias_min must be below bias_max"));
        }
        Ok(())
    }
}
