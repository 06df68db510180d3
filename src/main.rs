use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Args, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    commands::utils::init_logging(args.verbose);

    let config_path = commands::utils::resolve_config_path(args.config)?;

    match args.command {
        Commands::Init { output, force } => commands::gate::init(&output.unwrap_or(config_path), force),
        Commands::SetPin {
            question,
            answer,
            force,
        } => commands::gate::set_pin(&config_path, &question, &answer, force),
        Commands::ResetPin { answer } => commands::gate::reset_pin(&config_path, answer),
        Commands::Status => commands::gate::status(&config_path),
        Commands::Unlock => commands::gate::unlock(&config_path),
        Commands::Lock => commands::gate::lock(&config_path),
        Commands::Emergency { minutes } => commands::gate::emergency(&config_path, minutes),
        Commands::Classify { file } => commands::session::classify(&config_path, file),
    }
}
