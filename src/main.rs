use clap::{Parser, ValueEnum};

use seedhelper::errors::*;
use seedhelper::{default_config_dir, lock, logging, App};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Added,
    Done,
    Maintenance,
}

/// Post-completion helper invoked by the torrent daemon's "script-torrent-added"
/// and "script-torrent-done" hooks, or by an operator for routine maintenance.
#[derive(Parser, Debug)]
#[command(name = "seedhelper", version)]
struct Cli {
    /// Invocation mode. Defaults to maintenance when TR_TORRENT_ID is unset.
    #[arg(long, value_enum)]
    mode: Option<Mode>,
    /// Directory holding config.json, patterns.json, logfile.log.
    #[arg(long)]
    config_dir: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_dir = cli.config_dir.unwrap_or_else(default_config_dir);

    let app = App::load(&config_dir)?;
    logging::init(&config_dir.join("logfile.log"), &app.config.log_level)?;

    let lock = lock::FileLock::new("seedhelper.lock");
    let _guard = lock.acquire()?;

    let tid: Option<i64> = std::env::var("TR_TORRENT_ID").ok().and_then(|s| s.parse().ok());
    let mode = cli.mode.unwrap_or(match tid {
        Some(_) => Mode::Done,
        None => Mode::Maintenance,
    });

    let orchestrator = app.orchestrator()?;
    let result = match mode {
        Mode::Maintenance => orchestrator.maintenance(),
        Mode::Added => {
            let tid = tid.ok_or_else(|| anyhow!("mode=added requires TR_TORRENT_ID"))?;
            orchestrator.torrent_added(tid)
        }
        Mode::Done => {
            let tid = tid.ok_or_else(|| anyhow!("mode=done requires TR_TORRENT_ID"))?;
            orchestrator.torrent_done(tid)
        }
    };

    // A failure inside the run (RPC error, I/O error, ...) is logged and
    // swallowed so the process still exits 0 after the lock guard above
    // releases; only configuration errors and failures before the lock is
    // held propagate as a non-zero exit.
    if let Err(e) = &result {
        tracing::error!("run failed: {e:#}");
    }
    Ok(())
}
