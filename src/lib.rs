pub mod classify;
pub mod config;
pub mod copy;
pub mod errors;
pub mod fsutil;
pub mod knapsack;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod patterns;
pub mod rpc;
pub mod storage;
pub mod test_support;

use std::path::PathBuf;

use config::Config;
use errors::*;
use orchestrator::Orchestrator;
use patterns::PatternStore;
use rpc::{Client, HttpTransport};
use storage::StorageManager;

/// Directory the config file, pattern file, and log file live in, unless
/// overridden.
pub fn default_config_dir() -> PathBuf {
    std::env::var_os("SEEDHELPER_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/seedhelper"))
}

pub struct App {
    pub config: Config,
    pub patterns: PatternStore,
    pub client: Client<HttpTransport>,
}

impl App {
    pub fn load(config_dir: &std::path::Path) -> Result<Self> {
        let config = Config::load(&config_dir.join("config.json"))?;
        let patterns = PatternStore::load(&config_dir.join("patterns.json"))?;

        let username = (!config.rpc_username.is_empty()).then_some(config.rpc_username.as_str());
        let password = (!config.rpc_password.is_empty()).then_some(config.rpc_password.as_str());
        let transport = HttpTransport::new("127.0.0.1", config.rpc_port, &config.rpc_path, username, password)?;

        let seed_dir_override = (!config.seed_dir.is_empty()).then(|| PathBuf::from(&config.seed_dir));
        let client = Client::new(transport, seed_dir_override);

        Ok(Self { config, patterns, client })
    }

    pub fn orchestrator(&self) -> Result<Orchestrator<'_, HttpTransport>> {
        let watch_dir = (!self.config.watch_dir.is_empty()).then(|| self.config.watch_dir.clone());
        let storage = StorageManager::new(
            &self.client,
            self.config.seed_dir_quota_gib,
            self.config.seed_dir_reserve_space_gib,
            self.config.seed_dir_purge,
            watch_dir,
        )?;
        Ok(Orchestrator {
            client: &self.client,
            storage,
            config: &self.config,
            patterns: &self.patterns,
        })
    }
}
