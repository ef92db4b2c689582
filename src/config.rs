//! JSON config schema with typed defaults, path validation, and reversible
//! password obfuscation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::*;

const XOR_KEY: &[u8] = b"Claire Kuo";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "log-level")]
    pub log_level: String,
    #[serde(rename = "rpc-path")]
    pub rpc_path: String,
    #[serde(rename = "rpc-port")]
    pub rpc_port: u16,
    #[serde(rename = "rpc-username")]
    pub rpc_username: String,
    #[serde(rename = "rpc-password")]
    pub rpc_password: String,
    #[serde(rename = "seed-dir")]
    pub seed_dir: String,
    #[serde(rename = "seed-dir-purge")]
    pub seed_dir_purge: bool,
    #[serde(rename = "seed-dir-quota-gib")]
    pub seed_dir_quota_gib: f64,
    #[serde(rename = "seed-dir-reserve-space-gib")]
    pub seed_dir_reserve_space_gib: f64,
    #[serde(rename = "watch-dir")]
    pub watch_dir: String,
    #[serde(rename = "remove-public-on-complete")]
    pub remove_public_on_complete: bool,
    #[serde(rename = "public-upload-limited")]
    pub public_upload_limited: bool,
    #[serde(rename = "public-upload-limit-kbps")]
    pub public_upload_limit_kbps: i64,
    #[serde(rename = "dest-dir-default")]
    pub dest_dir_default: String,
    #[serde(rename = "dest-dir-movies")]
    pub dest_dir_movies: String,
    #[serde(rename = "dest-dir-tv-shows")]
    pub dest_dir_tv_shows: String,
    #[serde(rename = "dest-dir-music")]
    pub dest_dir_music: String,
    #[serde(rename = "dest-dir-av")]
    pub dest_dir_av: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            rpc_path: "/transmission/rpc".to_string(),
            rpc_port: 9091,
            rpc_username: String::new(),
            rpc_password: String::new(),
            seed_dir: String::new(),
            seed_dir_purge: false,
            seed_dir_quota_gib: 0.0,
            seed_dir_reserve_space_gib: 0.0,
            watch_dir: String::new(),
            remove_public_on_complete: false,
            public_upload_limited: false,
            public_upload_limit_kbps: 50,
            dest_dir_default: String::new(),
            dest_dir_movies: String::new(),
            dest_dir_tv_shows: String::new(),
            dest_dir_music: String::new(),
            dest_dir_av: String::new(),
        }
    }
}

impl Config {
    /// Reads and validates the config file, materializing one with defaults
    /// if it does not exist. Rewrites the file if normalization changed it
    /// (path normalization, or first-run password obfuscation).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let defaults = Config::default();
                let json = serde_json::to_string_pretty(&defaults)?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, json)?;
                bail!(ConfigError(format!(
                    "a blank configuration file has been created at {}; edit it before running again",
                    path.display()
                )));
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };

        // Unknown keys are ignored; missing/mistyped keys fall back to defaults
        // by merging onto a default-valued map rather than failing outright.
        let mut conf: Config = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(_) => merge_onto_defaults(&raw)?,
        };

        conf.dest_dir_default = normalize_path(&conf.dest_dir_default, true)?;
        conf.dest_dir_movies = normalize_optional_path(&conf.dest_dir_movies)?;
        conf.dest_dir_tv_shows = normalize_optional_path(&conf.dest_dir_tv_shows)?;
        conf.dest_dir_music = normalize_optional_path(&conf.dest_dir_music)?;
        conf.dest_dir_av = normalize_optional_path(&conf.dest_dir_av)?;
        conf.seed_dir = normalize_optional_path(&conf.seed_dir)?;
        conf.watch_dir = normalize_optional_path(&conf.watch_dir)?;

        let decoded_password = deobfuscate_password(&conf.rpc_password)?;
        let stored_password = obfuscate_password(&decoded_password);
        let rewrite_needed = stored_password != conf.rpc_password;
        conf.rpc_password = stored_password;

        if rewrite_needed {
            let json = serde_json::to_string_pretty(&conf)?;
            std::fs::write(path, json)?;
        }

        conf.rpc_password = decoded_password;
        Ok(conf)
    }

    pub fn dest_dir(&self, category: crate::classify::Category) -> &str {
        use crate::classify::Category::*;
        let candidate = match category {
            Default => &self.dest_dir_default,
            Movies => &self.dest_dir_movies,
            TvShows => &self.dest_dir_tv_shows,
            Music => &self.dest_dir_music,
            Av => &self.dest_dir_av,
        };
        if candidate.is_empty() {
            &self.dest_dir_default
        } else {
            candidate
        }
    }
}

fn merge_onto_defaults(raw: &str) -> Result<Config> {
    let user: serde_json::Value =
        serde_json::from_str(raw).context("config file is not valid JSON")?;
    let defaults = serde_json::to_value(Config::default())?;
    let mut merged = defaults.clone();
    if let (serde_json::Value::Object(def_map), serde_json::Value::Object(user_map)) =
        (&defaults, &user)
    {
        if let serde_json::Value::Object(ref mut out) = merged {
            for (k, default_v) in def_map {
                if let Some(user_v) = user_map.get(k) {
                    // Keep user value only if its JSON type matches the default's.
                    let same_shape = std::mem::discriminant(user_v) == std::mem::discriminant(default_v)
                        || (default_v.is_number() && user_v.is_number());
                    if same_shape {
                        out.insert(k.clone(), user_v.clone());
                    }
                }
            }
        }
    }
    Ok(serde_json::from_value(merged)?)
}

fn normalize_path(path: &str, required: bool) -> Result<String> {
    if path.is_empty() {
        if required {
            bail!(ConfigError("dest-dir-default cannot be empty".to_string()));
        }
        return Ok(String::new());
    }
    if !Path::new(path).is_absolute() {
        bail!(ConfigError(format!("path is not absolute: {path}")));
    }
    Ok(normpath(path))
}

fn normalize_optional_path(path: &str) -> Result<String> {
    normalize_path(path, false)
}

fn normpath(path: &str) -> String {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        use std::path::Component::*;
        match component {
            CurDir => {}
            ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.to_string_lossy().into_owned()
}

fn xor_cipher(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .zip(XOR_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

fn deobfuscate_password(stored: &str) -> Result<String> {
    if stored.is_empty() {
        return Ok(String::new());
    }
    if stored.starts_with('{') && stored.ends_with('}') {
        let hex = &stored[1..stored.len() - 1];
        let raw = hex::decode(hex).context("cannot decode the password")?;
        let plain = xor_cipher(&raw);
        String::from_utf8(plain).context("cannot decode the password")
    } else {
        Ok(stored.to_string())
    }
}

fn obfuscate_password(plain: &str) -> String {
    if plain.is_empty() {
        return String::new();
    }
    format!("{{{}}}", hex::encode(xor_cipher(plain.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_cipher_round_trips() {
        let plain = "hunter2";
        let obf = obfuscate_password(plain);
        assert!(obf.starts_with('{'));
        assert_eq!(deobfuscate_password(&obf).unwrap(), plain);
    }

    #[test]
    fn empty_password_round_trips_as_empty() {
        assert_eq!(obfuscate_password(""), "");
        assert_eq!(deobfuscate_password("").unwrap(), "");
    }

    #[test]
    fn normalize_rejects_relative_paths() {
        assert!(normalize_path("relative/path", true).is_err());
        assert!(normalize_path("/abs/path", true).is_ok());
    }

    #[test]
    fn missing_file_is_materialized_with_defaults() {
        let dir = std::env::temp_dir().join("seedhelper-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::remove_file(&path).ok();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("blank configuration"));
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
