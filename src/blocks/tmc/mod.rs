//! Timing multiplier circuit.
//!
//! A delay unit consists of one forward delay cell and `multiplier - 1`
//! backward cells. The timing multiplier chains `units` delay units: the
//! clock ripples forward through every unit, and the reversed clock returns
//! through the backward cells of each unit, so the sense amp enable leaves
//! the first unit `multiplier` times later than the clock edge that entered it.

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::error::{NetlistError, Result};
use crate::netlist::Library;
use crate::schematic::{Component, Generator, NoParams, SchematicCtx};

pub mod verify;

pub const DELAY_CELL_NAME: &str = "dbdr_delay_cell";
pub const DELAY_CELL_PORTS: [&str; 7] = ["clk_in", "din", "clk_out", "en", "dout", "vdd", "vss"];
pub const UNIT_PORTS: [&str; 7] = [
    "clk_in", "clk_out", "sae_in", "sae_out", "clk_rev", "vdd", "vss",
];
pub const TMC_PORTS: [&str; 5] = ["clk", "sae_in", "sae_out", "vdd", "vss"];

const UNIT_PREFIX: &str = "dbdr_delay_unit_";
const TMC_PREFIX: &str = "timing_multiplier_";

/// The delay cell primitive (an inverter and two NAND gates).
///
/// Its contents are defined outside of the generated netlist.
pub struct DbdrDelayCell;

pub struct TmcUnit {
    params: TmcUnitParams,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TmcUnitParams {
    /// The timing multiplier (must be at least 2).
    pub multiplier: usize,
}

pub struct Tmc {
    params: TmcParams,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TmcParams {
    /// The timing multiplier (must be at least 2).
    pub multiplier: usize,
    /// The number of delay units.
    pub units: usize,
}

/// The name of the delay unit cell for the given multiplier.
pub fn unit_name(multiplier: usize) -> ArcStr {
    arcstr::format!("{UNIT_PREFIX}{multiplier}")
}

/// The name of the timing multiplier cell for the given multiplier.
pub fn tmc_name(multiplier: usize) -> ArcStr {
    arcstr::format!("{TMC_PREFIX}{multiplier}")
}

/// Recovers the multiplier from a cell name such as `timing_multiplier_3`.
pub fn parse_tmc_name(name: &str) -> Option<usize> {
    name.strip_prefix(TMC_PREFIX)?.parse().ok()
}

impl TmcUnitParams {
    pub fn validate(&self) -> Result<()> {
        if self.multiplier < 2 {
            return Err(NetlistError::InvalidParams(format!(
                "timing multiplier must be at least 2, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

impl TmcParams {
    pub fn validate(&self) -> Result<()> {
        TmcUnitParams {
            multiplier: self.multiplier,
        }
        .validate()?;
        if self.units < 1 {
            return Err(NetlistError::InvalidParams(
                "timing multiplier must have at least one delay unit".to_string(),
            ));
        }
        Ok(())
    }
}

impl Component for DbdrDelayCell {
    type Params = NoParams;

    fn new(_params: &Self::Params) -> Result<Self> {
        Ok(Self)
    }

    fn name(&self) -> ArcStr {
        arcstr::literal!("dbdr_delay_cell")
    }

    fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()> {
        ctx.ports(DELAY_CELL_PORTS);
        ctx.set_external();
        Ok(())
    }
}

impl Component for TmcUnit {
    type Params = TmcUnitParams;

    fn new(params: &Self::Params) -> Result<Self> {
        params.validate()?;
        Ok(Self { params: *params })
    }

    fn name(&self) -> ArcStr {
        unit_name(self.params.multiplier)
    }

    fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()> {
        let [clk_in, clk_out, sae_in, sae_out, clk_rev, vdd, vss] = ctx.ports(UNIT_PORTS);
        let nn = ctx.signal("nn");

        ctx.instantiate::<DbdrDelayCell>(&NoParams)?
            .named("forward")
            .with_connections([
                ("clk_in", clk_in),
                ("din", vdd),
                ("clk_out", clk_out),
                ("en", sae_in),
                ("dout", nn),
                ("vdd", vdd),
                ("vss", vss),
            ])
            .add_to(ctx)?;

        // The reversed clock enters the first backward cell, which is gated by
        // the forward cell's output. The remaining backward cells are always enabled.
        let m = self.params.multiplier;
        let mut clk = clk_rev;
        let mut din = nn;
        for k in 1..m {
            let out = if k == m - 1 {
                sae_out
            } else {
                ctx.signal(format!("int{k}{}", k + 1))
            };
            let noconn = ctx.signal(format!("noconn{}", k - 1));

            ctx.instantiate::<DbdrDelayCell>(&NoParams)?
                .named(format!("backward_{}", k - 1))
                .with_connections([
                    ("clk_in", clk),
                    ("din", din),
                    ("clk_out", out),
                    ("en", vdd),
                    ("dout", noconn),
                    ("vdd", vdd),
                    ("vss", vss),
                ])
                .add_to(ctx)?;

            clk = out;
            din = vdd;
        }

        Ok(())
    }
}

impl Component for Tmc {
    type Params = TmcParams;

    fn new(params: &Self::Params) -> Result<Self> {
        params.validate()?;
        Ok(Self { params: *params })
    }

    fn name(&self) -> ArcStr {
        tmc_name(self.params.multiplier)
    }

    fn schematic(&self, ctx: &mut SchematicCtx) -> Result<()> {
        let [clk, sae_in, sae_out, vdd, vss] = ctx.ports(TMC_PORTS);
        let n = self.params.units;
        let f = ctx.bus("f", n);
        let clk_rev = ctx.bus("clk_rev_", n - 1);

        let unit = TmcUnitParams {
            multiplier: self.params.multiplier,
        };

        for i in 0..n {
            let unit_clk_in = if i == 0 { clk } else { f.index(i - 1) };
            let unit_sae_out = if i == 0 { sae_out } else { clk_rev.index(i - 1) };
            // The reversed clock of the last unit is tied low.
            let unit_clk_rev = if i == n - 1 { vss } else { clk_rev.index(i) };

            ctx.instantiate::<TmcUnit>(&unit)?
                .named(format!("delay_{i}"))
                .with_connections([
                    ("clk_in", unit_clk_in),
                    ("clk_out", f.index(i)),
                    ("sae_in", sae_in),
                    ("sae_out", unit_sae_out),
                    ("clk_rev", unit_clk_rev),
                    ("vdd", vdd),
                    ("vss", vss),
                ])
                .add_to(ctx)?;
        }

        Ok(())
    }
}

/// Generates the timing multiplier and all of its subcells.
pub fn generate_tmc(params: &TmcParams) -> Result<Library> {
    let mut gen = Generator::new();
    let top = gen.generate::<Tmc>(params)?;
    let mut lib = gen.into_library();
    lib.header.push(arcstr::format!(
        "{top}: {} delay units, multiplier {}",
        params.units,
        params.multiplier
    ));
    log::info!(
        "generated `{top}` with {} delay units of multiplier {}",
        params.units,
        params.multiplier
    );
    Ok(lib)
}
