//! Seed-dir/watch-dir purge and quota enforcement.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::errors::*;
use crate::fsutil::humansize;
use crate::knapsack;
use crate::rpc::{Client, Status, TorrentCli, TorrentIds, Torrent};

const REMOVAL_FIELDS: &[&str] = &[
    "activityDate",
    "doneDate",
    "id",
    "name",
    "peers",
    "percentDone",
    "sizeWhenDone",
    "status",
    "trackerStats",
];

pub struct StorageManager<'a, C: TorrentCli> {
    client: &'a Client<C>,
    quota_bytes: i64,
    reserve_bytes: i64,
    seed_dir_purge: bool,
    watch_dir: Option<String>,
}

pub enum TorrentAddedMode {
    Added,
    Done,
}

impl<'a, C: TorrentCli> StorageManager<'a, C> {
    pub fn new(
        client: &'a Client<C>,
        quota_gib: f64,
        reserve_space_gib: f64,
        seed_dir_purge: bool,
        watch_dir: Option<String>,
    ) -> Result<Self> {
        if quota_gib < 0.0 || reserve_space_gib < 0.0 {
            bail!("quota_gib and reserve_space_gib must be non-negative");
        }
        Ok(Self {
            client,
            quota_bytes: gib_to_bytes(quota_gib),
            reserve_bytes: gib_to_bytes(reserve_space_gib),
            seed_dir_purge,
            watch_dir,
        })
    }

    pub fn cleanup(&self) -> Result<()> {
        if let Some(watch_dir) = &self.watch_dir {
            self.clean_watch_dir(watch_dir);
        }
        if self.seed_dir_purge {
            self.clean_seed_dir()?;
        }
        Ok(())
    }

    fn clean_watch_dir(&self, watch_dir: &str) {
        let entries = match std::fs::read_dir(watch_dir) {
            Ok(it) => it,
            Err(e) => {
                tracing::error!("error scanning watch-dir: {e}");
                return;
            }
        };
        let now = SystemTime::now();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_torrent = path
                .extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case("torrent"))
                .unwrap_or(false);
            if !is_torrent {
                continue;
            }
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!("error checking {}: {e}", path.display());
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }
            let stale = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .map(|age| age > Duration::from_secs(3600))
                .unwrap_or(false);
            if meta.len() == 0 || stale {
                tracing::debug!("cleanup watch-dir: {}", path.display());
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::error!("error removing {}: {e}", path.display());
                }
            }
        }
    }

    fn clean_seed_dir(&self) -> Result<()> {
        let seed_dir = self.client.seed_dir()?;
        let seed_torrents = self.client.seed_dir_torrents()?;

        let mut allowed = std::collections::HashSet::new();
        for t in seed_torrents.values() {
            let download_dir = Path::new(&t.download_dir);
            if download_dir != seed_dir {
                if let Ok(rel) = download_dir.strip_prefix(&seed_dir) {
                    if let Some(first) = rel.components().next() {
                        allowed.insert(first.as_os_str().to_string_lossy().into_owned());
                        continue;
                    }
                }
            }
            allowed.insert(t.name.clone());
        }

        let entries = match std::fs::read_dir(&seed_dir) {
            Ok(it) => it,
            Err(e) => {
                tracing::error!("error scanning seed-dir: {e}");
                return Ok(());
            }
        };

        let mut total = 0usize;
        let mut extras = Vec::new();
        for entry in entries.flatten() {
            total += 1;
            let name = entry.file_name().to_string_lossy().into_owned();
            if allowed.contains(&name) {
                continue;
            }
            let path = entry.path();
            if let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) {
                let ext_is_part = path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case("part"))
                    .unwrap_or(false);
                if ext_is_part && allowed.contains(&stem) {
                    if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                        continue;
                    }
                }
            }
            extras.push(entry);
        }

        if !extras.is_empty() && extras.len() == total {
            tracing::warn!("skipping seed-dir cleanup: refused to delete all files");
            return Ok(());
        }

        for entry in extras {
            let path = entry.path();
            tracing::info!("cleanup seed-dir: {}", path.display());
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let result = if is_dir {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                tracing::error!("error removing {}: {e}", path.display());
            }
        }
        Ok(())
    }

    pub fn apply_quotas(&self, tid: Option<i64>, torrent_added: Option<TorrentAddedMode>) -> Result<()> {
        let (disk_total, mut disk_free) = self.client.get_freespace()?;
        let seed_torrents = self.client.seed_dir_torrents()?;
        let mut used_size: i64 = seed_torrents.values().map(|t| t.size_when_done as i64).sum();

        if let Some(tid) = tid {
            let mode = torrent_added.ok_or_else(|| anyhow!("tid given without torrent_added mode"))?;
            let in_seed_dir = seed_torrents.contains_key(&tid);
            match mode {
                TorrentAddedMode::Added if !in_seed_dir => {
                    bail!("torrent-added but torrent not in seed_dir (case 2)");
                }
                TorrentAddedMode::Done if in_seed_dir => {
                    bail!("torrent-done but torrent already in seed_dir (case 3)");
                }
                _ => {}
            }
            let all = self.client.torrents()?;
            let t_size = all
                .get(&tid)
                .map(|t| t.size_when_done as i64)
                .ok_or_else(|| TorrentNotFound(tid.to_string()))?;
            disk_free -= t_size as u64;
            if matches!(mode, TorrentAddedMode::Done) {
                used_size += t_size;
            }
        }

        let mut cap = disk_total as i64 - self.reserve_bytes;
        if self.quota_bytes > 0 && self.quota_bytes < cap {
            cap = self.quota_bytes;
        }

        let size_to_free = (used_size - cap).max(self.reserve_bytes - disk_free as i64);

        if size_to_free <= 0 {
            tracing::debug!("storage OK, headroom: {}", humansize(-size_to_free));
            return Ok(());
        }

        tracing::info!("storage limits exceeded by {}", humansize(size_to_free));

        let removal = self.find_optimal_removals(size_to_free)?;
        if !removal.is_empty() {
            let freed: u64 = removal.iter().map(|t| t.size_when_done).sum();
            let names: Vec<&str> = removal.iter().map(|t| t.name.as_str()).collect();
            tracing::info!(
                "remove {} torrent(s) ({}): \"{}\"",
                removal.len(),
                humansize(freed as i64),
                names.join("\", \"")
            );
            let ids = TorrentIds::List(removal.iter().map(|t| TorrentIds::Id(t.id)).collect());
            self.client.torrent_remove(ids, true)?;
        } else {
            tracing::warn!("no suitable torrents found for removal");
        }
        Ok(())
    }

    fn find_optimal_removals(&self, mut size_to_free: i64) -> Result<Vec<Torrent>> {
        if size_to_free <= 0 {
            bail!("size_to_free must be positive");
        }

        let candidates = self.get_removal_candidates()?;

        let mut removal = Vec::new();
        let mut with_leechers = Vec::new();
        let mut leecher_counts = Vec::new();
        for t in candidates {
            let max_tracker_leechers = t.tracker_stats.iter().map(|ts| ts.leecher_count).max().unwrap_or(0).max(0);
            let incomplete_peers = t.peers.iter().filter(|p| p.progress < 1.0).count() as i64;
            let leecher = max_tracker_leechers.max(incomplete_peers);
            if leecher > 0 {
                with_leechers.push(t);
                leecher_counts.push(leecher as u64);
            } else {
                removal.push(t);
            }
        }

        removal.sort_by_key(|t| t.activity_date);
        for (i, t) in removal.iter().enumerate() {
            size_to_free -= t.size_when_done as i64;
            if size_to_free <= 0 {
                removal.truncate(i + 1);
                return Ok(removal);
            }
        }

        let sizes: Vec<u64> = with_leechers.iter().map(|t| t.size_when_done).collect();
        let total: i64 = sizes.iter().sum::<u64>() as i64;
        let keep = knapsack::solve(&sizes, &leecher_counts, total - size_to_free, Some(1024 * 1024));
        for (i, t) in with_leechers.into_iter().enumerate() {
            if !keep.contains(&i) {
                removal.push(t);
            }
        }
        Ok(removal)
    }

    fn get_removal_candidates(&self) -> Result<Vec<Torrent>> {
        let seed_torrents = self.client.seed_dir_torrents()?;
        let ids = TorrentIds::List(seed_torrents.keys().map(|&id| TorrentIds::Id(id)).collect());
        let torrents = self.client.inner.torrent_get(REMOVAL_FIELDS, Some(ids))?;
        let mut torrents = filter_removal_candidates(torrents);

        let now = now_secs();
        let cutoff = now - 300;
        let pending: std::collections::HashSet<i64> = torrents
            .iter()
            .filter(|t| {
                !t.tracker_stats.is_empty()
                    && t.tracker_stats
                        .iter()
                        .all(|ts| ts.leecher_count <= 0 && !announced_since(ts, cutoff))
            })
            .map(|t| t.id)
            .collect();

        if pending.is_empty() {
            return Ok(torrents);
        }

        let reannounce_cutoff = now_secs();
        let reannounce_ids = TorrentIds::List(pending.iter().map(|&id| TorrentIds::Id(id)).collect());
        self.client.inner.torrent_reannounce(reannounce_ids)?;

        let mut remaining = pending.clone();
        let deadline = SystemTime::now() + Duration::from_secs(20);
        while !remaining.is_empty() && SystemTime::now() < deadline {
            std::thread::sleep(Duration::from_secs(3));
            let ids = TorrentIds::List(remaining.iter().map(|&id| TorrentIds::Id(id)).collect());
            let updates = self.client.inner.torrent_get(&["id", "trackerStats"], Some(ids))?;
            for t in updates {
                if t.tracker_stats.iter().any(|ts| announced_since(ts, reannounce_cutoff)) {
                    remaining.remove(&t.id);
                }
            }
        }

        let ids: Vec<i64> = torrents.iter().map(|t| t.id).collect();
        let ids = TorrentIds::List(ids.into_iter().map(TorrentIds::Id).collect());
        torrents = self.client.inner.torrent_get(REMOVAL_FIELDS, Some(ids))?;
        Ok(torrents)
    }
}

fn filter_removal_candidates(torrents: Vec<Torrent>) -> Vec<Torrent> {
    let cutoff = now_secs() - 43200;
    torrents
        .into_iter()
        .filter(|t| {
            t.percent_done == 1.0
                && matches!(
                    Status::from_code(t.status),
                    Some(Status::Stopped) | Some(Status::SeedWait) | Some(Status::Seed)
                )
                && t.done_date > 0
                && t.done_date < cutoff
        })
        .collect()
}

fn announced_since(ts: &crate::rpc::TrackerStat, cutoff: i64) -> bool {
    (ts.last_announce_succeeded && ts.last_announce_time > cutoff)
        || (ts.last_scrape_succeeded && ts.last_scrape_time > cutoff)
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn gib_to_bytes(gib: f64) -> i64 {
    (gib * 1073741824.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gib_conversion() {
        assert_eq!(gib_to_bytes(1.0), 1073741824);
        assert_eq!(gib_to_bytes(0.0), 0);
    }

    #[test]
    fn removal_candidates_require_complete_and_aged() {
        use crate::rpc::{PeerStat, Torrent};
        let t = Torrent {
            id: 1,
            name: "t".into(),
            files: vec![],
            download_dir: "/seed".into(),
            size_when_done: 100,
            percent_done: 1.0,
            is_private: false,
            status: 6,
            activity_date: 0,
            done_date: now_secs() - 50000,
            tracker_stats: vec![],
            peers: vec![] as Vec<PeerStat>,
        };
        let filtered = filter_removal_candidates(vec![t]);
        assert_eq!(filtered.len(), 1);
    }
}
