//! Drives the orchestrator end to end against a mock RPC backend, the way
//! an operator's hook invocation would, without touching a real daemon.

use std::path::PathBuf;

use seedhelper::classify::FileEntry;
use seedhelper::config::Config;
use seedhelper::orchestrator::Orchestrator;
use seedhelper::patterns::PatternStore;
use seedhelper::rpc::Client;
use seedhelper::storage::StorageManager;
use seedhelper::test_support::{blank_torrent, MockTransport};

fn patterns() -> PatternStore {
    let path = std::env::temp_dir().join("seedhelper-integration-patterns.json");
    std::fs::write(
        &path,
        r#"{
            "video_exts": ["mkv", "mp4"],
            "audio_exts": ["flac", "mp3"],
            "archive_exts": ["zip", "rar", "iso"],
            "av_regex": "\\bjav\\b",
            "tv_regex": "\\bs\\d{2}e\\d{2}\\b",
            "movie_regex": "\\b(19|20)\\d{2}\\b"
        }"#,
    )
    .unwrap();
    PatternStore::load(&path).unwrap()
}

fn config() -> Config {
    let mut c = Config::default();
    c.dest_dir_default = "/dest/default".to_string();
    c
}

#[test]
fn maintenance_is_a_noop_with_headroom_and_no_watch_dir() {
    let transport = MockTransport {
        session: serde_json::json!({ "download-dir": "/seed" }),
        free: (1_000_000_000_000, 900_000_000_000),
        ..Default::default()
    };
    let client = Client::new(transport, Some(PathBuf::from("/seed")));
    let cfg = config();
    let pats = patterns();
    let storage = StorageManager::new(&client, 0.0, 0.0, false, None).unwrap();
    let orch = Orchestrator { client: &client, storage, config: &cfg, patterns: &pats };

    orch.maintenance().unwrap();
    assert!(client.inner.removed.borrow().is_empty());
}

#[test]
fn torrent_added_caps_upload_for_public_torrents() {
    let transport = MockTransport {
        session: serde_json::json!({ "download-dir": "/seed" }),
        free: (1_000_000_000_000, 900_000_000_000),
        ..Default::default()
    };
    let mut t = blank_torrent(42);
    t.download_dir = "/seed".to_string();
    t.is_private = false;
    transport.torrents.borrow_mut().push(t);

    let client = Client::new(transport, Some(PathBuf::from("/seed")));
    let mut cfg = config();
    cfg.public_upload_limited = true;
    cfg.public_upload_limit_kbps = 100;
    let pats = patterns();
    let storage = StorageManager::new(&client, 0.0, 0.0, false, None).unwrap();
    let orch = Orchestrator { client: &client, storage, config: &cfg, patterns: &pats };

    orch.torrent_added(42).unwrap();

    let limits = client.inner.upload_limits.borrow();
    assert_eq!(limits.len(), 1);
    assert_eq!(limits[0], (42, 100, true));
}

#[test]
fn apply_quotas_removes_torrents_once_quota_is_exceeded() {
    let transport = MockTransport {
        session: serde_json::json!({ "download-dir": "/seed" }),
        // 10 GiB total, 1 GiB free: way under the configured quota floor.
        free: (10 * 1024 * 1024 * 1024, 1024 * 1024 * 1024),
        ..Default::default()
    };
    let mut t = blank_torrent(7);
    t.download_dir = "/seed".to_string();
    t.size_when_done = 9 * 1024 * 1024 * 1024;
    t.percent_done = 1.0;
    t.status = 6;
    t.done_date = 1;
    t.activity_date = 1;
    transport.torrents.borrow_mut().push(t);

    let client = Client::new(transport, Some(PathBuf::from("/seed")));
    let cfg = config();
    let pats = patterns();
    // Quota of 1 GiB forces the 9 GiB torrent above to be a removal candidate.
    let storage = StorageManager::new(&client, 1.0, 0.0, false, None).unwrap();
    let orch = Orchestrator { client: &client, storage, config: &cfg, patterns: &pats };

    orch.maintenance().unwrap();

    assert_eq!(*client.inner.removed.borrow(), vec![7]);
}

#[test]
fn classify_is_reachable_through_the_public_api() {
    let pats = patterns();
    let files = vec![FileEntry { path: "Show/s01e01.mkv".to_string(), length: 500_000_000 }];
    let category = seedhelper::classify::classify(&files, &pats).unwrap();
    assert_eq!(category, seedhelper::classify::Category::TvShows);
}
