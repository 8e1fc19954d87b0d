pub use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use tera::Tera;

pub mod backend;
pub mod blocks;
pub mod cli;
pub mod config;
pub mod error;
pub mod netlist;
pub mod paths;
pub mod plan;
pub mod schematic;
pub mod verification;

pub const BUILD_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/build");

lazy_static! {
    pub static ref TEMPLATES: Tera =
        match Tera::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/*")) {
            Ok(t) => t,
            Err(e) => panic!("Error parsing templates: {e}"),
        };
}

#[cfg(test)]
pub mod tests {
    use std::path::PathBuf;

    use super::BUILD_PATH;

    /// The generated netlist for a multiplier of 3 with 21 delay units.
    pub(crate) const TMC_3_NETLIST: &str =
        include_str!("../tests/data/timing_multiplier_3.spice");

    pub(crate) fn test_work_dir(name: &str) -> PathBuf {
        PathBuf::from(BUILD_PATH).join(name)
    }
}
