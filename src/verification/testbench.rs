//! Transient testbench for the timing multiplier.
//!
//! `clk` toggles with the configured period. `sae_in` rises a quarter period
//! after each clock edge and stays high for half a period, so the reversed
//! clock reaching `sae_out` can be compared against the clock edge.

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use derive_builder::Builder;
use serde::Serialize;
use tera::Context;

use crate::{Result, TEMPLATES};

const TEMPLATE: &str = "tmc_tb.spice";

#[derive(Debug, Clone, PartialEq, Builder, Serialize)]
#[builder(derive(Debug), build_fn(validate = "Self::validate"))]
pub struct TmcTbParams {
    /// Netlist containing the device under test.
    #[builder(setter(into))]
    pub netlist: PathBuf,
    #[builder(default)]
    pub includes: Vec<PathBuf>,
    /// Name of the top cell.
    #[builder(setter(into))]
    pub top: ArcStr,
    /// Ports of the top cell, in order.
    pub ports: Vec<ArcStr>,
    /// Supply voltage.
    #[builder(default = "1.8")]
    pub vdd: f64,
    #[builder(default = "4e-9")]
    pub period: f64,
    #[builder(default = "50e-12")]
    pub rise: f64,
    #[builder(default = "50e-12")]
    pub fall: f64,
    /// Defaults to four clock periods.
    #[builder(default)]
    pub tstop: Option<f64>,
}

impl TmcTbParams {
    #[inline]
    pub fn builder() -> TmcTbParamsBuilder {
        TmcTbParamsBuilder::default()
    }
}

impl TmcTbParamsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(vdd) = self.vdd {
            if vdd <= 0.0 {
                return Err(format!("supply voltage must be positive, got {vdd}"));
            }
        }
        let period = self.period.unwrap_or(4e-9);
        if period <= 0.0 {
            return Err(format!("clock period must be positive, got {period}"));
        }
        let edges = self.rise.unwrap_or(50e-12) + self.fall.unwrap_or(50e-12);
        if edges >= period / 2.0 {
            return Err(format!(
                "rise and fall times ({edges:e}) must fit within half a clock period"
            ));
        }
        if let Some(Some(tstop)) = self.tstop {
            if tstop <= 0.0 {
                return Err(format!("stop time must be positive, got {tstop}"));
            }
        }
        if let Some(ports) = &self.ports {
            for port in ["clk", "sae_in", "vdd", "vss"] {
                if !ports.iter().any(|p| p == port) {
                    return Err(format!("top cell must have a `{port}` port"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct TbContext<'a> {
    top: &'a str,
    netlist: String,
    includes: Vec<String>,
    ports: &'a [ArcStr],
    vdd: String,
    period: String,
    rise: String,
    fall: String,
    clk_delay: String,
    clk_width: String,
    sae_delay: String,
    sae_width: String,
    tstep: String,
    tstop: String,
}

/// Formats a time in seconds as a SPICE number.
fn time(t: f64) -> String {
    format!("{t:e}")
}

pub fn generate_tmc_tb(params: &TmcTbParams) -> Result<String> {
    let period = params.period;
    let half = period / 2.0;
    let ctx = TbContext {
        top: &params.top,
        netlist: params.netlist.display().to_string(),
        includes: params
            .includes
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        ports: &params.ports,
        vdd: format!("{}", params.vdd),
        period: time(period),
        rise: time(params.rise),
        fall: time(params.fall),
        clk_delay: time(half),
        clk_width: time(half - params.rise),
        sae_delay: time(half + period / 4.0),
        sae_width: time(half - params.rise),
        tstep: time(period / 1000.0),
        tstop: time(params.tstop.unwrap_or(4.0 * period)),
    };

    Ok(TEMPLATES.render(TEMPLATE, &Context::from_serialize(ctx)?)?)
}

pub fn save_tmc_tb(path: impl AsRef<Path>, params: &TmcTbParams) -> Result<()> {
    let tb = generate_tmc_tb(params)?;

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, tb)?;
    log::info!("wrote testbench for `{}` to {:?}", params.top, path);

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::blocks::tmc::TMC_PORTS;

    use super::*;

    fn tmc_ports() -> Vec<ArcStr> {
        TMC_PORTS.iter().map(|&p| ArcStr::from(p)).collect()
    }

    #[test]
    fn tmc_3_testbench() {
        let params = TmcTbParams::builder()
            .netlist("timing_multiplier_3.spice")
            .includes(vec![PathBuf::from("dbdr_delay_cell.spice")])
            .top("timing_multiplier_3")
            .ports(tmc_ports())
            .build()
            .unwrap();
        let tb = generate_tmc_tb(&params).unwrap();

        assert!(tb.starts_with("* Transient testbench for timing_multiplier_3\n"));
        assert!(tb.contains(".include \"timing_multiplier_3.spice\"\n"));
        assert!(tb.contains(".include \"dbdr_delay_cell.spice\"\n"));
        assert!(tb.contains("Vvdd vdd 0 1.8\n"));
        let clk = tb.lines().find(|l| l.starts_with("Vclk ")).unwrap();
        assert!(clk.starts_with("Vclk clk 0 PULSE(0 1.8 2e-9 5e-11 5e-11 "));
        assert!(clk.ends_with(" 4e-9)"));
        assert!(tb.contains("Xdut clk sae_in sae_out vdd vss timing_multiplier_3\n"));
        let tran = tb.lines().find(|l| l.starts_with(".tran ")).unwrap();
        assert!(tran.ends_with(" 1.6e-8"));
        assert!(tb.trim_end().ends_with(".end"));
    }

    #[test]
    fn explicit_stop_time() {
        let params = TmcTbParams::builder()
            .netlist("tmc.spice")
            .top("timing_multiplier_3")
            .ports(tmc_ports())
            .vdd(1.6)
            .tstop(Some(2e-8))
            .build()
            .unwrap();
        let tb = generate_tmc_tb(&params).unwrap();
        assert!(tb.contains("Vvdd vdd 0 1.6\n"));
        assert!(tb.lines().any(|l| l.starts_with(".tran ") && l.ends_with(" 2e-8")));
    }

    #[test]
    fn invalid_params() {
        let builder = || {
            let mut b = TmcTbParams::builder();
            b.netlist("tmc.spice")
                .top("timing_multiplier_3")
                .ports(tmc_ports());
            b
        };
        assert!(builder().vdd(0.0).build().is_err());
        assert!(builder().period(-1e-9).build().is_err());
        assert!(builder().rise(2e-9).build().is_err());
        assert!(builder()
            .ports(vec![ArcStr::from("clk"), ArcStr::from("vdd")])
            .build()
            .is_err());
        assert!(TmcTbParams::builder().top("tmc").build().is_err());
    }

    #[test]
    fn save_testbench() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tb/tmc_tb.spice");
        let params = TmcTbParams::builder()
            .netlist("tmc.spice")
            .top("timing_multiplier_3")
            .ports(tmc_ports())
            .build()
            .unwrap();
        save_tmc_tb(&path, &params).unwrap();
        let tb = std::fs::read_to_string(&path).unwrap();
        assert_eq!(tb, generate_tmc_tb(&params).unwrap());
    }
}
