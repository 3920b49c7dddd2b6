//! QFOS CLI entry point.

use clap::Parser;
use qfos::cli::{commands, Cli, Commands};
use qfos::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let json = cli.json;

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                eprintln!("Error: {e}");
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("qfos=info"),
            2 => EnvFilter::new("qfos=debug"),
            _ => EnvFilter::new("qfos=trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Run { input, output } => {
            commands::run::execute(input.clone(), output.clone(), cli.config.clone(), json)
        }
        Commands::Bundle { input, window_ms, no_refine } => {
            commands::bundle::execute(input.clone(), *window_ms, *no_refine, cli.config.clone(), json)
        }
        Commands::ValidateConfig => commands::validate::execute(cli.config.clone(), json),
    }
}
