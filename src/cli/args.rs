use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about,
    help_template(
        "{before-help}{name} {version}\n{author-with-newline}{about-with-newline}\n{usage-heading} {usage}\n\n{all-args}{after-help}"
    )
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a timing multiplier netlist from a configuration file.
    Generate(GenerateArgs),
    /// Check the structure of a SPICE netlist.
    Check(CheckArgs),
    /// Flatten a SPICE netlist into a single subcircuit.
    Flatten(FlattenArgs),
}

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "tmc22.toml")]
    pub config: PathBuf,

    /// Directory to which output files should be saved.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also write a flattened copy of the netlist.
    #[arg(long)]
    pub flatten: bool,

    /// Also write a transient testbench.
    #[arg(long)]
    pub testbench: bool,
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// SPICE netlist to check.
    pub netlist: PathBuf,

    /// Top cell. Defaults to the last subcircuit in the file.
    #[arg(long)]
    pub top: Option<String>,

    /// Cells that may be instantiated without a definition.
    #[arg(long = "external", default_value = "dbdr_delay_cell")]
    pub externals: Vec<String>,

    /// Run the timing multiplier checks with the given multiplier.
    ///
    /// Inferred from the top cell name when it is `timing_multiplier_<m>`.
    #[arg(short, long)]
    pub multiplier: Option<usize>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct FlattenArgs {
    /// SPICE netlist to flatten.
    pub netlist: PathBuf,

    /// Cell to flatten.
    #[arg(long)]
    pub top: String,

    /// Output path. Defaults to `<top>.flat.spice` next to the input.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
