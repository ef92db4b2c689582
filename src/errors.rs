pub use anyhow::{anyhow, bail, Context as _, Error, Result};

#[derive(Debug)]
pub struct Timeout(pub &'static str);
impl std::error::Error for Timeout {}
impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed out waiting for {}", self.0)
    }
}

#[derive(Debug)]
pub struct InvalidId(pub String);
impl std::error::Error for InvalidId {}
impl std::fmt::Display for InvalidId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid torrent id: {}", self.0)
    }
}

#[derive(Debug)]
pub struct AuthRequired;
impl std::error::Error for AuthRequired {}
impl std::fmt::Display for AuthRequired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC authentication failed")
    }
}

#[derive(Debug)]
pub struct TorrentNotFound(pub String);
impl std::error::Error for TorrentNotFound {}
impl std::fmt::Display for TorrentNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "torrent not found: {}", self.0)
    }
}

#[derive(Debug)]
pub struct ConfigError(pub String);
impl std::error::Error for ConfigError {}
impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}
