use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use voltwarp_core::{Federation, RunConfig, SimError};

/// Optimistic parallel simulation of an EV charging station network.
#[derive(Parser, Debug)]
#[command(name = "voltwarp", version, about)]
struct Args {
    /// Master config; its `configFile` is resolved next to it.
    #[arg(default_value = "config/config.json")]
    config: PathBuf,

    /// Report directory, overriding `outputDir` from the config.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("voltwarp: {e}");
            match e {
                SimError::ConfigNotFound { .. } | SimError::ConfigMalformed { .. } => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run(args: &Args) -> Result<(), SimError> {
    let config = RunConfig::load(&args.config)?;
    let out_dir = args.out.clone().unwrap_or_else(|| config.master.output_dir.clone());

    let federation = Federation::from_config(&config);
    log::info!(
        "simulating {} stations from {} to {}",
        config.stations.len(),
        federation.time().start(),
        federation.time().end()
    );
    let outcome = federation.run()?;
    let written = outcome.write_reports(&out_dir, federation.time())?;
    log::info!("wrote {} reports to {}", written.len(), out_dir.display());
    Ok(())
}
