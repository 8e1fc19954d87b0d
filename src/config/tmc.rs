use anyhow::Result;
use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::blocks::tmc::{TmcParams, DELAY_CELL_NAME};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TmcConfig {
    pub multiplier: usize,
    pub units: usize,
    /// Cells whose definitions live outside of the generated netlist.
    #[serde(default = "default_external")]
    pub external: Vec<ArcStr>,
    pub testbench: Option<TestbenchConfig>,
}

/// Transient testbench settings. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestbenchConfig {
    pub vdd: f64,
    pub period: f64,
    pub rise: f64,
    pub fall: f64,
    pub tstop: Option<f64>,
    /// Extra files to include, such as models or the delay cell netlist.
    pub includes: Vec<PathBuf>,
}

impl Default for TestbenchConfig {
    fn default() -> Self {
        Self {
            vdd: 1.8,
            period: 4e-9,
            rise: 50e-12,
            fall: 50e-12,
            tstop: None,
            includes: Vec::new(),
        }
    }
}

fn default_external() -> Vec<ArcStr> {
    vec![ArcStr::from(DELAY_CELL_NAME)]
}

impl TmcConfig {
    #[inline]
    pub fn params(&self) -> TmcParams {
        TmcParams {
            multiplier: self.multiplier,
            units: self.units,
        }
    }
}

pub fn parse_tmc_config(path: impl AsRef<Path>) -> Result<TmcConfig> {
    let contents = fs::read_to_string(path)?;
    let data = toml::from_str(&contents)?;
    Ok(data)
}
