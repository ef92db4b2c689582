use clap::{Parser, Subcommand};

use seedhelper::errors::*;
use seedhelper::{default_config_dir, logging, App};

/// Operator-facing control for the seeding helper: run storage manager
/// operations ad hoc without forging the daemon hook's environment.
#[derive(Parser, Debug)]
#[command(name = "seedctl", version)]
struct Cli {
    #[arg(long)]
    config_dir: Option<std::path::PathBuf>,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print seed-dir usage and free space.
    Status,
    /// Run the watch-dir/seed-dir purge without touching quotas.
    Cleanup,
    /// Enforce quota and free-space policy now.
    ApplyQuotas,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(default_config_dir);

    let app = App::load(&config_dir)?;
    logging::init(&config_dir.join("logfile.log"), &app.config.log_level).ok();

    let orchestrator = app.orchestrator()?;
    match cli.command {
        Cmd::Status => {
            let (total, free) = app.client.get_freespace()?;
            println!("seed_dir: {}", app.client.seed_dir()?.display());
            println!("total: {}", seedhelper::fsutil::humansize(total as i64));
            println!("free: {}", seedhelper::fsutil::humansize(free as i64));
        }
        Cmd::Cleanup => orchestrator.storage.cleanup()?,
        Cmd::ApplyQuotas => orchestrator.storage.apply_quotas(None, None)?,
    }
    Ok(())
}
