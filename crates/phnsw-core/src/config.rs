//! Simulator configuration
//!
//! Settings load from a TOML file, either at the root or under a `[phnsw]`
//! section. Every field is optional and falls back to its default. When a
//! `[phnsw]` section is present, root-level keys are ignored with a warning.
//!
//! ```toml
//! [phnsw]
//! scratch_size = 1024
//! max_addr = 4194304
//! scratch_line_size = 64
//! mem_line_size = 64
//! spm_latency = 1
//! mem_latency = 10
//! clock = "1GHz"
//! max_cycles = 100000
//! ```

use crate::error::{PhnswError, Result};
use phnsw_chip::layout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Memory and run parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Scratchpad bytes; backing memory starts here
    pub scratch_size: u64,
    /// Size of the flat address space
    pub max_addr: u64,
    /// Largest request the scratchpad accepts
    pub scratch_line_size: u64,
    /// Largest request backing memory accepts
    pub mem_line_size: u64,
    /// Scratchpad response latency in cycles
    pub spm_latency: u64,
    /// Backing memory response latency in cycles
    pub mem_latency: u64,
    /// Clock rate label, reported only
    pub clock: String,
    /// Cycle budget for `run`
    pub max_cycles: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            scratch_size: layout::MEM_ADDR_BASE,
            max_addr: layout::LAYOUT_END,
            scratch_line_size: 64,
            mem_line_size: 64,
            spm_latency: 1,
            mem_latency: 10,
            clock: "1GHz".to_string(),
            max_cycles: 1_000_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RootConfig {
    #[serde(default)]
    phnsw: Option<SimConfig>,
    #[serde(flatten)]
    direct: SimConfig,
}

impl SimConfig {
    /// Load and validate a TOML config file
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `ConfigParse` if it is not valid
    /// TOML, `InvalidConfig` if a value is rejected by [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let parse_error = |source| PhnswError::ConfigParse { path: path.to_path_buf(), source };

        let table: toml::Table = toml::from_str(&contents).map_err(parse_error)?;
        let ignored = shadowed_root_keys(&table);
        if !ignored.is_empty() {
            warn!(
                "{}: [phnsw] section present, ignoring root-level keys: {}",
                path.display(),
                ignored.join(", ")
            );
        }
        let root: RootConfig = toml::Value::Table(table).try_into().map_err(parse_error)?;
        let config = root.phnsw.unwrap_or(root.direct);
        config.validate()?;
        Ok(config)
    }

    /// Check the memory parameters
    ///
    /// # Errors
    ///
    /// `InvalidConfig` naming the first rejected field.
    pub fn validate(&self) -> Result<()> {
        if self.scratch_size == 0 {
            return Err(PhnswError::invalid_config("scratch_size must be at least 1"));
        }
        if self.max_addr <= self.scratch_size {
            return Err(PhnswError::invalid_config("max_addr must be larger than scratch_size"));
        }
        if !self.scratch_line_size.is_power_of_two() {
            return Err(PhnswError::invalid_config(
                "scratch_line_size must be a non-zero power of 2",
            ));
        }
        if !self.mem_line_size.is_power_of_two() {
            return Err(PhnswError::invalid_config("mem_line_size must be a non-zero power of 2"));
        }
        if self.mem_line_size < self.scratch_line_size {
            return Err(PhnswError::invalid_config(
                "mem_line_size must be greater than or equal to scratch_line_size",
            ));
        }
        if self.spm_latency == 0 || self.mem_latency == 0 {
            return Err(PhnswError::invalid_config("latencies must be at least 1 cycle"));
        }
        Ok(())
    }
}

/// Root-level keys that a `[phnsw]` section overrides.
fn shadowed_root_keys(table: &toml::Table) -> Vec<&str> {
    if !table.contains_key("phnsw") {
        return Vec::new();
    }
    table.keys().map(String::as_str).filter(|key| *key != "phnsw").collect()
}
