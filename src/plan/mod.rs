use std::collections::HashSet;
use std::path::Path;

use anyhow::bail;
use arcstr::ArcStr;

use crate::blocks::tmc::verify::verify_tmc;
use crate::blocks::tmc::{generate_tmc, tmc_name, TmcParams, TMC_PORTS};
use crate::cli::progress::StepContext;
use crate::config::tmc::{TestbenchConfig, TmcConfig};
use crate::netlist::flatten::flatten_library;
use crate::netlist::parser::Parser;
use crate::netlist::report::Report;
use crate::netlist::validate::{validate, ValidateOpts};
use crate::paths::{out_flat_spice, out_report, out_spice, out_testbench};
use crate::verification::testbench::{save_tmc_tb, TmcTbParams};
use crate::Result;

/// A concrete plan for a timing multiplier.
///
/// Has a 1-1 mapping with a schematic.
pub struct TmcPlan {
    pub tmc_params: TmcParams,
    pub external: Vec<ArcStr>,
    pub testbench: Option<TestbenchConfig>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    GeneratePlan,
    GenerateNetlist,
    CheckNetlist,
    FlattenNetlist,
    GenerateTestbench,
}

pub struct ExecutePlanParams<'a> {
    pub work_dir: &'a Path,
    pub plan: &'a TmcPlan,
    pub tasks: &'a HashSet<TaskKey>,
    pub ctx: Option<&'a mut StepContext>,
}

impl TmcPlan {
    #[inline]
    pub fn name(&self) -> ArcStr {
        tmc_name(self.tmc_params.multiplier)
    }
}

pub fn generate_plan(config: &TmcConfig) -> Result<TmcPlan> {
    let &TmcConfig {
        multiplier, units, ..
    } = config;

    if multiplier < 2 {
        bail!("The timing multiplier must be at least 2");
    }

    if units < 1 {
        bail!("The timing multiplier must have at least one delay unit");
    }

    if let Some(tb) = &config.testbench {
        if tb.vdd <= 0.0 || tb.period <= 0.0 {
            bail!("The testbench supply voltage and clock period must be positive");
        }
    }

    Ok(TmcPlan {
        tmc_params: config.params(),
        external: config.external.clone(),
        testbench: config.testbench.clone(),
    })
}

macro_rules! try_finish_task {
    ( $ctx:expr, $task:expr ) => {
        if let Some(ctx) = $ctx.as_mut() {
            ctx.finish($task);
        }
    };
}

macro_rules! try_execute_task {
    ( $tasks:expr, $task:expr, $body:expr, $ctx:expr) => {
        if $tasks.contains(&$task) {
            $body;
            try_finish_task!($ctx, $task);
        }
    };
}

/// Writes the netlist, checks the written file, and runs any optional tasks.
///
/// Returns the combined check report.
pub fn execute_plan(params: ExecutePlanParams) -> Result<Report> {
    let ExecutePlanParams {
        work_dir,
        plan,
        tasks,
        mut ctx,
    } = params;

    std::fs::create_dir_all(work_dir)?;

    let name = plan.name();

    let spice_path = out_spice(work_dir, &name);
    generate_tmc(&plan.tmc_params)?.save_spice(&spice_path)?;
    try_finish_task!(ctx, TaskKey::GenerateNetlist);

    // Check what was written, not the in-memory library.
    let lib = Parser::parse_file(&spice_path)?;
    let mut report = validate(
        &lib,
        &ValidateOpts::with_externals(plan.external.iter().cloned()),
    );
    report.extend(verify_tmc(&lib, &name, plan.tmc_params.multiplier));

    let report_path = out_report(work_dir, &name);
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    log::info!("wrote check report to {:?}", report_path);

    if !report.is_ok() {
        for finding in report.errors() {
            log::error!("{finding}");
        }
        bail!(
            "Generated netlist failed {} checks; see {:?}",
            report.errors().count(),
            report_path
        );
    }
    try_finish_task!(ctx, TaskKey::CheckNetlist);

    try_execute_task!(
        tasks,
        TaskKey::FlattenNetlist,
        {
            let flat = flatten_library(&lib, &name)?;
            flat.save_spice(out_flat_spice(work_dir, &name))?;
        },
        ctx
    );

    try_execute_task!(
        tasks,
        TaskKey::GenerateTestbench,
        {
            let tb = plan.testbench.clone().unwrap_or_default();
            let params = TmcTbParams::builder()
                .netlist(spice_path.clone())
                .includes(tb.includes)
                .top(name.clone())
                .ports(TMC_PORTS.iter().map(|&p| ArcStr::from(p)).collect())
                .vdd(tb.vdd)
                .period(tb.period)
                .rise(tb.rise)
                .fall(tb.fall)
                .tstop(tb.tstop)
                .build()?;
            save_tmc_tb(out_testbench(work_dir, &name), &params)?;
        },
        ctx
    );

    Ok(report)
}
