//! Neuroevolution of spiking-network robot controllers.
//!
//! CMA-ES searches the fixed-length parameter vector of a small spiking
//! controller. Every generation appends its best individual to a CSV
//! checkpoint log that a separate process can read and replay while the
//! search keeps running.

pub mod config;
pub mod engines;
pub mod error;
pub mod types;
