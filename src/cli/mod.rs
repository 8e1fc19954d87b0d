use std::collections::HashSet;
use std::fs::canonicalize;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use arcstr::ArcStr;
use clap::Parser;

use crate::blocks::tmc::parse_tmc_name;
use crate::blocks::tmc::verify::verify_tmc;
use crate::cli::args::{Args, CheckArgs, Command, FlattenArgs, GenerateArgs};
use crate::cli::progress::StepContext;
use crate::config::tmc::parse_tmc_config;
use crate::netlist::flatten::flatten_library;
use crate::netlist::report::{Report, Severity};
use crate::netlist::validate::{validate, ValidateOpts};
use crate::netlist::Library;
use crate::paths::out_flat_spice;
use crate::plan::{execute_plan, generate_plan, ExecutePlanParams, TaskKey};
use crate::Result;

pub mod args;
pub mod progress;

pub const BANNER: &str = r"
 _____ __  __  ____ ____  ____
|_   _|  \/  |/ ___|___ \|___ \
  | | | |\/| | |     __) | __) |
  | | | |  | | |___ / __/ / __/
  |_| |_|  |_|\____|_____|_____|

TMC22 v0.2
";

pub fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Generate(args) => generate(args),
        Command::Check(args) => check(args),
        Command::Flatten(args) => flatten(args),
    }
}

fn generate(args: GenerateArgs) -> Result<()> {
    let config_path = canonicalize(&args.config)?;

    println!("{BANNER}");

    println!("Reading configuration file...\n");
    let config = parse_tmc_config(&config_path)?;

    println!("Configuration file: {:?}", &config_path);
    println!("Timing multiplier parameters:");
    println!("\tMultiplier: {}", config.multiplier);
    println!("\tDelay units: {}", config.units);
    println!("\tExternal cells: {}", config.external.join(", "));

    let enabled_tasks = [
        (args.flatten, TaskKey::FlattenNetlist),
        (args.testbench, TaskKey::GenerateTestbench),
    ]
    .into_iter()
    .filter_map(|(a, b)| if a { Some(b) } else { None });

    let tasks = HashSet::from_iter(enabled_tasks);

    let mut ctx = StepContext::new(&tasks);

    let plan = ctx.check(generate_plan(&config))?;
    ctx.finish(TaskKey::GeneratePlan);

    let work_dir = if let Some(output_dir) = args.output_dir {
        output_dir
    } else {
        PathBuf::from(plan.name().as_str())
    };
    std::fs::create_dir_all(&work_dir)?;
    let work_dir = canonicalize(work_dir)?;

    let res = execute_plan(ExecutePlanParams {
        work_dir: &work_dir,
        plan: &plan,
        tasks: &tasks,
        ctx: Some(&mut ctx),
    });

    let report = ctx.check(res)?;
    print_summary(&report);
    println!("Artifacts saved to: {:?}\n", &work_dir);

    Ok(())
}

/// Picks the cell named by `top`, or the last subcircuit in the library.
fn resolve_top(lib: &Library, top: Option<String>) -> Result<ArcStr> {
    match top {
        Some(top) => Ok(top.into()),
        None => lib
            .subckts()
            .last()
            .map(|s| s.name.clone())
            .ok_or_else(|| anyhow!("netlist defines no subcircuits")),
    }
}

/// Runs the structural checks on `lib`, plus the timing multiplier checks
/// when a multiplier is given or can be read from the name of `top`.
fn check_library(
    lib: &Library,
    top: &ArcStr,
    externals: &[String],
    multiplier: Option<usize>,
) -> Report {
    let mut report = validate(
        lib,
        &ValidateOpts::with_externals(externals.iter().map(String::as_str)),
    );
    if !lib.contains(top) {
        report.error(
            top.clone(),
            "missing_cell",
            format!("top cell `{top}` is not defined"),
        );
        return report;
    }

    if let Some(multiplier) = multiplier.or_else(|| parse_tmc_name(top)) {
        log::info!("checking `{top}` as a timing multiplier with multiplier {multiplier}");
        report.extend(verify_tmc(lib, top, multiplier));
    }
    report
}

fn check(args: CheckArgs) -> Result<()> {
    let lib = crate::netlist::parser::Parser::parse_file(&args.netlist)?;
    let top = resolve_top(&lib, args.top)?;
    let report = check_library(&lib, &top, &args.externals, args.multiplier);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for finding in report.findings.iter() {
            println!("{finding}");
        }
        print_summary(&report);
    }

    if !report.is_ok() {
        bail!(
            "{} errors found in {:?}",
            report.errors().count(),
            args.netlist
        );
    }
    Ok(())
}

fn flatten(args: FlattenArgs) -> Result<()> {
    let lib = crate::netlist::parser::Parser::parse_file(&args.netlist)?;
    let flat = flatten_library(&lib, &args.top)?;

    let output = args.output.unwrap_or_else(|| {
        out_flat_spice(
            args.netlist.parent().unwrap_or(Path::new("")),
            &args.top,
        )
    });
    flat.save_spice(&output)?;
    println!("Flattened netlist saved to: {:?}", &output);

    Ok(())
}

fn print_summary(report: &Report) {
    println!(
        "{} errors, {} warnings, {} notes",
        report.with_severity(Severity::Error).count(),
        report.with_severity(Severity::Warning).count(),
        report.with_severity(Severity::Info).count(),
    );
}

#[cfg(test)]
mod tests {
    use crate::netlist::parser::Parser;
    use crate::tests::TMC_3_NETLIST;

    use super::*;

    fn externals() -> Vec<String> {
        vec!["dbdr_delay_cell".to_string()]
    }

    #[test]
    fn check_reference_netlist() {
        let lib = Parser::parse(TMC_3_NETLIST).unwrap();
        let top = resolve_top(&lib, None).unwrap();
        assert_eq!(top, "timing_multiplier_3");

        let report = check_library(&lib, &top, &externals(), None);
        assert!(report.is_ok(), "{report:?}");
        assert_eq!(report.with_code("reverse_chain_tied_low").count(), 1);
    }

    #[test]
    fn missing_top_is_reported_once() {
        let lib = Parser::parse(TMC_3_NETLIST).unwrap();
        let top = arcstr::literal!("timing_multiplier_4");

        let report = check_library(&lib, &top, &externals(), None);
        assert_eq!(report.with_code("missing_cell").count(), 1);
        assert_eq!(report.errors().count(), 1);

        let report = check_library(&lib, &top, &externals(), Some(3));
        assert_eq!(report.with_code("missing_cell").count(), 1);
        assert_eq!(report.errors().count(), 1);
    }
}
