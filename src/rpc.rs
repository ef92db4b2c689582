//! JSON-RPC client for the torrent daemon: retry/session-token handling,
//! id validation, and a read-mostly snapshot cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::*;

const SESSION_HEADER: &str = "X-Transmission-Session-Id";
const RETRIES: u32 = 3;
const MAX_SESSION_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped = 0,
    CheckWait = 1,
    Check = 2,
    DownloadWait = 3,
    Download = 4,
    SeedWait = 5,
    Seed = 6,
}

impl Status {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Status::Stopped,
            1 => Status::CheckWait,
            2 => Status::Check,
            3 => Status::DownloadWait,
            4 => Status::Download,
            5 => Status::SeedWait,
            6 => Status::Seed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileStat {
    pub name: String,
    pub length: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerStat {
    #[serde(rename = "leecherCount")]
    pub leecher_count: i64,
    #[serde(rename = "lastAnnounceSucceeded")]
    pub last_announce_succeeded: bool,
    #[serde(rename = "lastAnnounceTime")]
    pub last_announce_time: i64,
    #[serde(rename = "lastScrapeSucceeded")]
    pub last_scrape_succeeded: bool,
    #[serde(rename = "lastScrapeTime")]
    pub last_scrape_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerStat {
    pub progress: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Torrent {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub files: Vec<FileStat>,
    #[serde(rename = "downloadDir", default)]
    pub download_dir: String,
    #[serde(rename = "sizeWhenDone", default)]
    pub size_when_done: u64,
    #[serde(rename = "percentDone", default)]
    pub percent_done: f64,
    #[serde(rename = "isPrivate", default)]
    pub is_private: bool,
    #[serde(default)]
    pub status: i64,
    #[serde(rename = "activityDate", default)]
    pub activity_date: i64,
    #[serde(rename = "doneDate", default)]
    pub done_date: i64,
    #[serde(rename = "trackerStats", default)]
    pub tracker_stats: Vec<TrackerStat>,
    #[serde(default)]
    pub peers: Vec<PeerStat>,
}

/// Accepted id shapes: a single integer, a list of ids/hashes, or the
/// literal "recently-active". Omitted entirely means "all torrents".
#[derive(Debug, Clone)]
pub enum TorrentIds {
    Id(i64),
    Hash(String),
    List(Vec<TorrentIds>),
    RecentlyActive,
}

impl TorrentIds {
    pub fn validate(&self) -> Result<Value> {
        match self {
            TorrentIds::Id(i) => {
                if *i < 0 {
                    bail!(InvalidId(i.to_string()));
                }
                Ok(json!(i))
            }
            TorrentIds::Hash(h) => {
                if h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()) {
                    Ok(json!(h))
                } else {
                    bail!(InvalidId(h.clone()));
                }
            }
            TorrentIds::RecentlyActive => Ok(json!("recently-active")),
            TorrentIds::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.validate()?);
                }
                Ok(json!(out))
            }
        }
    }
}

impl From<i64> for TorrentIds {
    fn from(v: i64) -> Self {
        TorrentIds::Id(v)
    }
}

impl From<Vec<i64>> for TorrentIds {
    fn from(v: Vec<i64>) -> Self {
        TorrentIds::List(v.into_iter().map(TorrentIds::Id).collect())
    }
}

/// The minimum operation set the core requires from the daemon.
pub trait TorrentCli {
    fn torrent_get(&self, fields: &[&str], ids: Option<TorrentIds>) -> Result<Vec<Torrent>>;
    fn torrent_remove(&self, ids: TorrentIds, delete_local_data: bool) -> Result<()>;
    fn torrent_set_location(&self, ids: TorrentIds, location: &str, do_move: bool) -> Result<()>;
    fn torrent_set_upload_limit(&self, ids: TorrentIds, limit_kbps: i64, limited: bool) -> Result<()>;
    fn torrent_reannounce(&self, ids: TorrentIds) -> Result<()>;
    fn torrent_start(&self, ids: TorrentIds) -> Result<()>;
    fn torrent_stop(&self, ids: TorrentIds) -> Result<()>;
    fn torrent_verify(&self, ids: TorrentIds) -> Result<()>;
    fn torrent_start_now(&self, ids: TorrentIds) -> Result<()>;
    fn session_get(&self) -> Result<Value>;
    fn free_space(&self, path: &str) -> Result<(u64, u64)>;
}

/// Session wrapper that owns the cache and is generic over the transport.
pub struct Client<C: TorrentCli> {
    pub inner: C,
    seed_dir: RefCell<Option<PathBuf>>,
    torrents: RefCell<Option<HashMap<i64, Torrent>>>,
}

const SNAPSHOT_FIELDS: &[&str] = &["id", "name", "downloadDir", "isPrivate", "sizeWhenDone"];

impl<C: TorrentCli> Client<C> {
    pub fn new(inner: C, seed_dir_override: Option<PathBuf>) -> Self {
        Self {
            inner,
            seed_dir: RefCell::new(seed_dir_override),
            torrents: RefCell::new(None),
        }
    }

    pub fn seed_dir(&self) -> Result<PathBuf> {
        if let Some(p) = self.seed_dir.borrow().as_ref() {
            return Ok(p.clone());
        }
        let settings = self.inner.session_get()?;
        let raw = settings
            .get("download-dir")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("session-get did not return download-dir"))?;
        let canon = std::fs::canonicalize(raw).unwrap_or_else(|_| PathBuf::from(raw));
        *self.seed_dir.borrow_mut() = Some(canon.clone());
        Ok(canon)
    }

    fn snapshot(&self) -> Result<HashMap<i64, Torrent>> {
        if let Some(snap) = self.torrents.borrow().as_ref() {
            return Ok(snap.clone());
        }
        let torrents = self.inner.torrent_get(SNAPSHOT_FIELDS, None)?;
        let mut map = HashMap::new();
        let seed_dir = self.seed_dir()?;
        for mut t in torrents {
            t.download_dir = std::fs::canonicalize(&t.download_dir)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or(t.download_dir);
            let _ = &seed_dir;
            map.insert(t.id, t);
        }
        *self.torrents.borrow_mut() = Some(map.clone());
        Ok(map)
    }

    pub fn torrents(&self) -> Result<HashMap<i64, Torrent>> {
        self.snapshot()
    }

    pub fn seed_dir_torrents(&self) -> Result<HashMap<i64, Torrent>> {
        let seed_dir = self.seed_dir()?;
        let all = self.snapshot()?;
        Ok(all
            .into_iter()
            .filter(|(_, t)| crate::fsutil::is_subpath(std::path::Path::new(&t.download_dir), &seed_dir))
            .collect())
    }

    fn invalidate(&self) {
        *self.torrents.borrow_mut() = None;
    }

    pub fn torrent_remove(&self, ids: TorrentIds, delete_local_data: bool) -> Result<()> {
        self.inner.torrent_remove(ids, delete_local_data)?;
        self.invalidate();
        Ok(())
    }

    pub fn torrent_set_location(&self, ids: TorrentIds, location: &str, do_move: bool) -> Result<()> {
        self.inner.torrent_set_location(ids, location, do_move)?;
        self.invalidate();
        Ok(())
    }

    pub fn get_freespace(&self) -> Result<(u64, u64)> {
        let seed_dir = self.seed_dir()?;
        self.inner.free_space(&seed_dir.to_string_lossy())
    }
}

/// Real transport, backed by a blocking `reqwest` client.
pub struct HttpTransport {
    url: String,
    http: reqwest::blocking::Client,
    auth: Option<(String, String)>,
    session_id: RefCell<Option<String>>,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16, path: &str, username: Option<&str>, password: Option<&str>) -> Result<Self> {
        let url = format!("http://{host}:{port}{path}");
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        let auth = match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() => Some((u.to_string(), p.to_string())),
            _ => None,
        };
        Ok(Self {
            url,
            http,
            auth,
            session_id: RefCell::new(None),
        })
    }

    fn call(&self, method: &str, mut arguments: Value, ids: Option<TorrentIds>) -> Result<Value> {
        if let Some(ids) = ids {
            let validated = ids.validate()?;
            if let Value::Object(ref mut map) = arguments {
                map.insert("ids".to_string(), validated);
            } else {
                arguments = json!({ "ids": validated });
            }
        }
        let mut query = json!({ "method": method });
        if arguments != Value::Null {
            query["arguments"] = arguments;
        }

        // A 409 session-token response is renegotiated and retried immediately
        // without consuming one of the `RETRIES` attempts; `session_retries`
        // is a separate, generous safety bound so a server that never accepts
        // the captured token can't spin this loop forever.
        let mut last_err: Option<Error> = None;
        let mut attempt = 0u32;
        let mut session_retries = 0u32;
        loop {
            attempt += 1;
            tracing::debug!(attempt, method, "requesting RPC");
            let mut req = self.http.post(&self.url).json(&query);
            if let Some((user, pass)) = &self.auth {
                req = req.basic_auth(user, Some(pass));
            }
            if let Some(sid) = self.session_id.borrow().as_ref() {
                req = req.header(SESSION_HEADER, sid.clone());
            }
            match req.send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if status == 401 || status == 403 {
                        bail!(AuthRequired);
                    }
                    if status == 409 {
                        if let Some(sid) = resp.headers().get(SESSION_HEADER) {
                            if let Ok(sid) = sid.to_str() {
                                *self.session_id.borrow_mut() = Some(sid.to_string());
                            }
                        }
                        attempt -= 1;
                        session_retries += 1;
                        if session_retries > MAX_SESSION_RETRIES {
                            bail!(anyhow!("RPC call stuck renegotiating session token"));
                        }
                        continue;
                    }
                    match resp.json::<Value>() {
                        Ok(data) => {
                            if data.get("result").and_then(Value::as_str) == Some("success") {
                                return Ok(data["arguments"].clone());
                            }
                            last_err = Some(anyhow!("RPC error: {:?}", data.get("result")));
                        }
                        Err(e) => last_err = Some(e.into()),
                    }
                }
                Err(e) => last_err = Some(e.into()),
            }
            if attempt >= RETRIES {
                break;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("RPC call failed with no response")))
    }
}

impl TorrentCli for HttpTransport {
    fn torrent_get(&self, fields: &[&str], ids: Option<TorrentIds>) -> Result<Vec<Torrent>> {
        let args = json!({ "fields": fields });
        let resp = self.call("torrent-get", args, ids)?;
        let torrents = resp
            .get("torrents")
            .cloned()
            .ok_or_else(|| anyhow!("torrent-get response missing torrents"))?;
        Ok(serde_json::from_value(torrents)?)
    }

    fn torrent_remove(&self, ids: TorrentIds, delete_local_data: bool) -> Result<()> {
        self.call("torrent-remove", json!({ "delete-local-data": delete_local_data }), Some(ids))?;
        Ok(())
    }

    fn torrent_set_location(&self, ids: TorrentIds, location: &str, do_move: bool) -> Result<()> {
        self.call(
            "torrent-set-location",
            json!({ "location": location, "move": do_move }),
            Some(ids),
        )?;
        Ok(())
    }

    fn torrent_set_upload_limit(&self, ids: TorrentIds, limit_kbps: i64, limited: bool) -> Result<()> {
        self.call(
            "torrent-set",
            json!({ "uploadLimit": limit_kbps, "uploadLimited": limited }),
            Some(ids),
        )?;
        Ok(())
    }

    fn torrent_reannounce(&self, ids: TorrentIds) -> Result<()> {
        self.call("torrent-reannounce", Value::Null, Some(ids))?;
        Ok(())
    }

    fn torrent_start(&self, ids: TorrentIds) -> Result<()> {
        self.call("torrent-start", Value::Null, Some(ids))?;
        Ok(())
    }

    fn torrent_stop(&self, ids: TorrentIds) -> Result<()> {
        self.call("torrent-stop", Value::Null, Some(ids))?;
        Ok(())
    }

    fn torrent_verify(&self, ids: TorrentIds) -> Result<()> {
        self.call("torrent-verify", Value::Null, Some(ids))?;
        Ok(())
    }

    fn torrent_start_now(&self, ids: TorrentIds) -> Result<()> {
        self.call("torrent-start-now", Value::Null, Some(ids))?;
        Ok(())
    }

    fn session_get(&self) -> Result<Value> {
        self.call("session-get", Value::Null, None)
    }

    fn free_space(&self, path: &str) -> Result<(u64, u64)> {
        let resp = self.call("free-space", json!({ "path": path }), None)?;
        let total = resp.get("total_size").and_then(Value::as_u64).unwrap_or(0);
        let free = resp.get("size-bytes").and_then(Value::as_u64).unwrap_or(0);
        Ok((total, free))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_validation_rejects_negative() {
        assert!(TorrentIds::Id(-1).validate().is_err());
        assert!(TorrentIds::Id(5).validate().is_ok());
    }

    #[test]
    fn id_validation_requires_40_hex_chars() {
        assert!(TorrentIds::Hash("a".repeat(40)).validate().is_ok());
        assert!(TorrentIds::Hash("zz".to_string()).validate().is_err());
    }

    /// A 409 session-token challenge must not eat into the 3-attempt retry
    /// budget: a daemon that challenges once and then succeeds should
    /// resolve on what amounts to the first real attempt.
    #[test]
    fn session_retry_does_not_consume_attempt_budget() {
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let request_count = Arc::new(AtomicUsize::new(0));
        let counter = request_count.clone();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(s) => s,
                    Err(_) => break,
                };
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    let resp = "HTTP/1.1 409 Conflict\r\nX-Transmission-Session-Id: abc123\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
                    let _ = stream.write_all(resp.as_bytes());
                } else {
                    let body = br#"{"result":"success","arguments":{}}"#;
                    let resp = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = stream.write_all(resp.as_bytes());
                    let _ = stream.write_all(body);
                    break;
                }
            }
        });

        let transport = HttpTransport::new(&addr.ip().to_string(), addr.port(), "/rpc", None, None).unwrap();
        let result = transport.session_get();
        assert!(result.is_ok());
        assert_eq!(request_count.load(Ordering::SeqCst), 2);
    }
}
