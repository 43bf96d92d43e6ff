use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(about = "Exercises a logic graph end-to-end: compile, link, update, report", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a single script, drive its inputs, and run it for N ticks.
    Run(RunArgs),
    /// Load a save file, run it for N ticks, and report outputs and errors.
    Load(LoadArgs),
    /// Load a save file and print its validate() warnings without updating it.
    Validate(ValidateArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to a Lua source file declaring interface()/run()
    pub script: PathBuf,

    /// Number of update() ticks to run
    #[arg(long, default_value_t = 1)]
    pub ticks: u32,

    /// "field=value" float input to set before the first tick, repeatable
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub inputs: Vec<String>,

    /// Print the output tree after every tick instead of only the last
    #[arg(long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub struct LoadArgs {
    /// Path to a file previously written by logic_format::save
    pub save_file: PathBuf,

    /// Number of update() ticks to run
    #[arg(long, default_value_t = 1)]
    pub ticks: u32,

    /// Print every node's tree after every tick instead of only the last
    #[arg(long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Path to a file previously written by logic_format::save
    pub save_file: PathBuf,
}

pub fn parse() -> Result<Command> {
    Ok(Cli::parse().command)
}
