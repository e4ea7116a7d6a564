use super::journal::write_atomically;
use crate::config::CheckpointPolicy;
use crate::engines::codec::GenomeSchema;
use crate::error::{EvoError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// JSON sidecar describing the run that produced a checkpoint log.
///
/// Written once when a run starts. Two schemas can share a genome length,
/// so readers compare fingerprints rather than column counts alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub schema_fingerprint: String,
    pub schema: GenomeSchema,
    pub genome_len: usize,
    pub sigma: f64,
    pub population_size: usize,
    pub seed: Option<u64>,
    pub checkpoint_policy: CheckpointPolicy,
}

/// `<log>.manifest.json` next to the log.
pub fn manifest_path(log_path: &Path) -> PathBuf {
    let mut name = log_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "checkpoint".into());
    name.push(".manifest.json");
    log_path.with_file_name(name)
}

impl RunManifest {
    pub fn new(
        schema: &GenomeSchema,
        sigma: f64,
        population_size: usize,
        seed: Option<u64>,
        checkpoint_policy: CheckpointPolicy,
    ) -> Self {
        Self {
            created_at: Utc::now(),
            schema_fingerprint: schema.fingerprint(),
            schema: schema.clone(),
            genome_len: schema.len(),
            sigma,
            population_size,
            seed,
            checkpoint_policy,
        }
    }

    pub fn write(&self, log_path: &Path) -> Result<()> {
        let path = manifest_path(log_path);
        let json = serde_json::to_string_pretty(self)?;
        write_atomically(&path, |buf| {
            std::io::Write::write_all(buf, json.as_bytes())?;
            Ok(())
        })
    }

    /// Manifest for `log_path`, or `None` for logs written without one.
    pub fn read(log_path: &Path) -> Result<Option<Self>> {
        let path = manifest_path(log_path);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Fails unless the log was produced under `schema`.
    pub fn check(&self, schema: &GenomeSchema) -> Result<()> {
        if self.genome_len != schema.len() {
            return Err(EvoError::SchemaMismatch {
                expected: schema.len(),
                actual: self.genome_len,
            });
        }
        let active = schema.fingerprint();
        if self.schema_fingerprint != active {
            return Err(EvoError::SchemaFingerprint {
                active,
                found: self.schema_fingerprint.clone(),
            });
        }
        Ok(())
    }
}
