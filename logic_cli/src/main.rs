use anyhow::Result;

mod cli;
mod commands;
mod report;

fn main() -> Result<()> {
    match cli::parse()? {
        cli::Command::Run(args) => commands::run(args),
        cli::Command::Load(args) => commands::load(args),
        cli::Command::Validate(args) => commands::validate(args),
    }
}
