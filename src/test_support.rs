//! An in-memory `TorrentCli` double shared by unit tests and the `tests/`
//! integration suite. Not part of the crate's public contract with the
//! daemon — just a fixture.

use std::cell::RefCell;

use serde_json::Value;

use crate::errors::*;
use crate::rpc::{Torrent, TorrentCli, TorrentIds};

#[derive(Default)]
pub struct MockTransport {
    pub torrents: RefCell<Vec<Torrent>>,
    pub removed: RefCell<Vec<i64>>,
    pub upload_limits: RefCell<Vec<(i64, i64, bool)>>,
    pub session: Value,
    pub free: (u64, u64),
}

impl TorrentCli for MockTransport {
    fn torrent_get(&self, _fields: &[&str], ids: Option<TorrentIds>) -> Result<Vec<Torrent>> {
        let all = self.torrents.borrow().clone();
        match ids {
            None => Ok(all),
            Some(TorrentIds::Id(id)) => Ok(all.into_iter().filter(|t| t.id == id).collect()),
            Some(TorrentIds::List(items)) => {
                let ids: Vec<i64> = items
                    .into_iter()
                    .filter_map(|i| match i {
                        TorrentIds::Id(id) => Some(id),
                        _ => None,
                    })
                    .collect();
                Ok(all.into_iter().filter(|t| ids.contains(&t.id)).collect())
            }
            _ => Ok(all),
        }
    }

    fn torrent_remove(&self, ids: TorrentIds, _delete_local_data: bool) -> Result<()> {
        if let TorrentIds::List(items) = ids {
            for i in items {
                if let TorrentIds::Id(id) = i {
                    self.removed.borrow_mut().push(id);
                }
            }
        }
        Ok(())
    }

    fn torrent_set_location(&self, _ids: TorrentIds, _location: &str, _do_move: bool) -> Result<()> {
        Ok(())
    }

    fn torrent_set_upload_limit(&self, ids: TorrentIds, limit_kbps: i64, limited: bool) -> Result<()> {
        if let TorrentIds::Id(id) = ids {
            self.upload_limits.borrow_mut().push((id, limit_kbps, limited));
        }
        Ok(())
    }

    fn torrent_reannounce(&self, _ids: TorrentIds) -> Result<()> {
        Ok(())
    }

    fn torrent_start(&self, _ids: TorrentIds) -> Result<()> {
        Ok(())
    }

    fn torrent_stop(&self, _ids: TorrentIds) -> Result<()> {
        Ok(())
    }

    fn torrent_verify(&self, _ids: TorrentIds) -> Result<()> {
        Ok(())
    }

    fn torrent_start_now(&self, _ids: TorrentIds) -> Result<()> {
        Ok(())
    }

    fn session_get(&self) -> Result<Value> {
        Ok(self.session.clone())
    }

    fn free_space(&self, _path: &str) -> Result<(u64, u64)> {
        Ok(self.free)
    }
}

/// A `Torrent` with every field defaulted to something inert, so call sites
/// only need to set the fields their scenario cares about.
pub fn blank_torrent(id: i64) -> Torrent {
    Torrent {
        id,
        name: format!("torrent-{id}"),
        files: vec![],
        download_dir: String::new(),
        size_when_done: 0,
        percent_done: 0.0,
        is_private: false,
        status: 6,
        activity_date: 0,
        done_date: 0,
        tracker_stats: vec![],
        peers: vec![],
    }
}
