//! Category inference from a torrent's file list.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::fsutil::normalize;
use crate::patterns::PatternStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Default,
    Movies,
    TvShows,
    Music,
    Av,
}

impl Category {
    /// Tie-break order when two categories score equally: TV, Movies, Music, Default.
    fn rank(self) -> u8 {
        match self {
            Category::TvShows => 0,
            Category::Movies => 1,
            Category::Music => 2,
            Category::Default => 3,
            Category::Av => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub length: u64,
}

const NAME_BONUS: f64 = 0.30;
const MAX_NOISE_RATIO: u64 = 20; // drop videos below max/20
const MAX_NOISE_ABS: u64 = 50 * 1024 * 1024; // or 50 MiB, whichever is smaller
const BD_ISO_MIN_BYTES: u64 = 21 * 1024 * 1024 * 1024;

// The vts branch matches real DVD-Video names like `VTS_01_1.VOB`/`VTS_01_1.IFO`
// (title-set number, then a mandatory part-number segment before the
// extension) rather than requiring digits to sit immediately before the dot.
static DISC_RE: once_cell_like::Lazy<Regex> = once_cell_like::Lazy::new(|| {
    Regex::new(
        r"(?i)^(?P<root>.*/)?(bdmv/(index\.bdmv|stream/[^/]+\.m2ts)|(video_ts/)?([^/]*vts[0-9_]+|video_ts)\.(ifo|vob)|hvdvd_ts/[^/]+\.evo)$",
    )
    .expect("static disc regex")
});

pub fn classify(files: &[FileEntry], patterns: &PatternStore) -> Result<Category> {
    if files.is_empty() {
        bail!("cannot classify a torrent with no files");
    }

    // Step 1: torrent-name classification.
    let torrent_name = top_level_name(&files[0].path);
    let normalized_name = normalize(&torrent_name);
    if patterns.is_av(&normalized_name) {
        return Ok(Category::Av);
    }
    let name_cat = name_category(&normalized_name, patterns);

    // Step 2: per-file processing with disc-tree collapse.
    let mut disc_roots: Vec<String> = Vec::new();
    for f in files {
        let normalized = normalize(&f.path);
        if let Some(caps) = DISC_RE.captures(&normalized) {
            let root = caps.name("root").map(|m| m.as_str().to_string()).unwrap_or_default();
            if !disc_roots.contains(&root) {
                disc_roots.push(root);
            }
        }
    }
    // Longest root wins when nested; scan longest-first.
    disc_roots.sort_by_key(|r| std::cmp::Reverse(r.len()));

    let mut videos: HashMap<(String, String), u64> = HashMap::new();
    let mut archives: HashMap<(String, String), u64> = HashMap::new();
    let mut audio_bytes: u64 = 0;
    let mut other_bytes: u64 = 0;

    for f in files {
        let normalized = normalize(&f.path);
        if let Some(root) = disc_roots.iter().find(|r| normalized.starts_with(r.as_str())) {
            let entry = videos.entry((root.clone(), "disc".to_string())).or_insert(0);
            *entry += f.length;
            continue;
        }
        let (root, ext) = split_ext(&normalized);
        if patterns.video_exts.contains(&ext) {
            *videos.entry((root, ext)).or_insert(0) += f.length;
        } else if patterns.archive_exts.contains(&ext) {
            *archives.entry((root, ext)).or_insert(0) += f.length;
        } else if patterns.audio_exts.contains(&ext) {
            audio_bytes += f.length;
        } else {
            other_bytes += f.length;
        }
    }

    // Step 3: drop noise entries.
    if videos.len() >= 2 {
        let max_size = *videos.values().max().unwrap_or(&0);
        let threshold = (max_size / MAX_NOISE_RATIO).min(MAX_NOISE_ABS);
        videos.retain(|_, &mut size| size >= threshold);
    }

    // Step 4: AV override on content.
    let mut segments: Vec<&str> = Vec::new();
    for (root, _) in videos.keys() {
        segments.extend(root.split('/').filter(|s| !s.is_empty()));
    }
    for (root, _) in archives.keys() {
        segments.extend(root.split('/').filter(|s| !s.is_empty()));
    }
    for s in &segments {
        if patterns.is_av(s) {
            return Ok(Category::Av);
        }
    }

    // Step 5: score remaining categories.
    let mut scores: HashMap<Category, f64> = HashMap::new();
    let video_bytes: u64 = videos.values().sum();

    let is_tv_video = videos
        .keys()
        .any(|(root, _)| root.split('/').filter(|s| !s.is_empty()).any(|s| patterns.is_tv(s)))
        || find_sequence(&videos);
    if is_tv_video {
        *scores.entry(Category::TvShows).or_insert(0.0) += video_bytes as f64;
    } else {
        *scores.entry(Category::Movies).or_insert(0.0) += video_bytes as f64;
    }

    for ((root, ext), size) in &archives {
        let segs: Vec<&str> = root.split('/').filter(|s| !s.is_empty()).collect();
        let cat = if segs.iter().any(|s| patterns.is_tv(s)) {
            Category::TvShows
        } else if segs.iter().any(|s| patterns.is_movie(s)) {
            Category::Movies
        } else if ext == "iso" && *size >= BD_ISO_MIN_BYTES {
            Category::Movies
        } else {
            Category::Default
        };
        *scores.entry(cat).or_insert(0.0) += *size as f64;
    }

    *scores.entry(Category::Music).or_insert(0.0) += audio_bytes as f64;
    *scores.entry(Category::Default).or_insert(0.0) += other_bytes as f64;

    // Step 6: name bonus.
    if let Some(cat) = name_cat {
        let total_bytes: u64 = video_bytes + audio_bytes + other_bytes
            + archives.values().sum::<u64>();
        *scores.entry(cat).or_insert(0.0) += NAME_BONUS * total_bytes as f64;
    }

    // Step 7: pick the winner.
    let winner = scores
        .into_iter()
        .max_by(|(ca, va), (cb, vb)| {
            va.partial_cmp(vb)
                .unwrap()
                .then_with(|| cb.rank().cmp(&ca.rank()))
        })
        .map(|(c, _)| c)
        .unwrap_or(Category::Default);

    Ok(winner)
}

fn name_category(normalized_name: &str, patterns: &PatternStore) -> Option<Category> {
    if patterns.is_tv(normalized_name) {
        Some(Category::TvShows)
    } else if patterns.is_movie(normalized_name) {
        Some(Category::Movies)
    } else {
        None
    }
}

/// First path segment if multi-component, else the stem of the single file.
fn top_level_name(first_path: &str) -> String {
    let trimmed = first_path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((first, _)) => first.to_string(),
        None => {
            let stem = trimmed.rsplit_once('.').map(|(s, _)| s).unwrap_or(trimmed);
            stem.to_string()
        }
    }
}

fn split_ext(path: &str) -> (String, String) {
    match path.rsplit_once('.') {
        Some((root, ext)) if !ext.is_empty() && !root.ends_with('/') => {
            (root.to_string(), ext.to_string())
        }
        _ => (path.to_string(), String::new()),
    }
}

/// True iff some `(dirname, prefix, suffix, ext)` group has three consecutive
/// integers in 1..99 found in the file stem.
///
/// The `regex` crate has no lookaround, so a number's digit-boundary (not
/// part of a longer run of digits) is checked by hand against the bytes
/// before and after each match rather than with `(?<!\d)`/`(?!\d)`.
fn find_sequence(videos: &HashMap<(String, String), u64>) -> bool {
    let digit_re = Regex::new(r"[0-9]{1,2}").expect("static regex");
    let mut groups: HashMap<(String, String, String, String), u128> = HashMap::new();
    for (root, ext) in videos.keys() {
        let (dirname, stem) = match root.rsplit_once('/') {
            Some((d, s)) => (d.to_string(), s.to_string()),
            None => (String::new(), root.clone()),
        };
        let bytes = stem.as_bytes();
        for m in digit_re.find_iter(&stem) {
            let preceded_by_digit = m.start() > 0 && bytes[m.start() - 1].is_ascii_digit();
            let followed_by_digit = m.end() < bytes.len() && bytes[m.end()].is_ascii_digit();
            if preceded_by_digit || followed_by_digit {
                continue;
            }
            let n: u32 = m.as_str().trim_start_matches('0').parse().unwrap_or(0);
            if n == 0 || n > 99 {
                continue;
            }
            let prefix = stem[..m.start()].to_string();
            let suffix = stem[m.end()..].to_string();
            let key = (dirname.clone(), prefix, suffix, ext.clone());
            let bits = groups.entry(key).or_insert(0u128);
            *bits |= 1u128 << n;
            if *bits & (*bits >> 1) & (*bits >> 2) != 0 {
                return true;
            }
        }
    }
    false
}

mod once_cell_like {
    use std::sync::OnceLock;

    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Self {
                cell: OnceLock::new(),
                init,
            }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn patterns() -> PatternStore {
        let dir = std::env::temp_dir();
        let path = dir.join("seedhelper-classify-test-patterns.json");
        std::fs::write(
            &path,
            r#"{
                "video_exts": ["mkv", "mp4"],
                "audio_exts": ["flac", "mp3"],
                "archive_exts": ["zip", "rar", "iso"],
                "av_regex": "\\bjav\\b|\\bfc2\\b",
                "tv_regex": "\\bs\\d{2}e\\d{2}\\b",
                "movie_regex": "\\b(19|20)\\d{2}\\b"
            }"#,
        )
        .unwrap();
        PatternStore::load(&path).unwrap()
    }

    fn f(path: &str, length: u64) -> FileEntry {
        FileEntry { path: path.to_string(), length }
    }

    #[test]
    fn tv_show_by_sequence() {
        let p = patterns();
        let files = vec![
            f("Show/episode.01.mkv", 500_000_000),
            f("Show/episode.02.mkv", 500_000_000),
            f("Show/episode.03.mkv", 500_000_000),
        ];
        assert_eq!(classify(&files, &p).unwrap(), Category::TvShows);
    }

    #[test]
    fn movie_by_name_and_single_video() {
        let p = patterns();
        let files = vec![f("Movie.2020.BluRay/movie.2020.mkv", 4_000_000_000)];
        assert_eq!(classify(&files, &p).unwrap(), Category::Movies);
    }

    #[test]
    fn av_by_name_overrides_everything() {
        let p = patterns();
        let files = vec![f("FC2-123456/video.mkv", 1_000_000_000)];
        assert_eq!(classify(&files, &p).unwrap(), Category::Av);
    }

    #[test]
    fn music_by_audio_majority() {
        let p = patterns();
        let files = vec![
            f("Album/01.flac", 40_000_000),
            f("Album/02.flac", 40_000_000),
            f("Album/cover.jpg", 500_000),
        ];
        assert_eq!(classify(&files, &p).unwrap(), Category::Music);
    }

    #[test]
    fn noise_samples_are_dropped() {
        let p = patterns();
        let files = vec![
            f("Movie.2020/movie.2020.mkv", 4_000_000_000),
            f("Movie.2020/sample.mkv", 10_000_000),
        ];
        assert_eq!(classify(&files, &p).unwrap(), Category::Movies);
    }

    #[test]
    fn tv_show_by_sequence_unpadded_double_digits() {
        let p = patterns();
        let files = vec![
            f("Show/episode10.mkv", 500_000_000),
            f("Show/episode11.mkv", 500_000_000),
            f("Show/episode12.mkv", 500_000_000),
        ];
        assert_eq!(classify(&files, &p).unwrap(), Category::TvShows);
    }

    #[test]
    fn tv_show_by_sequence_above_63() {
        let p = patterns();
        let files = vec![
            f("Show/episode64.mkv", 500_000_000),
            f("Show/episode65.mkv", 500_000_000),
            f("Show/episode66.mkv", 500_000_000),
        ];
        assert_eq!(classify(&files, &p).unwrap(), Category::TvShows);
    }

    #[test]
    fn find_sequence_rejects_three_digit_runs() {
        let mut videos = HashMap::new();
        videos.insert(("Show/episode100".to_string(), "mkv".to_string()), 1);
        videos.insert(("Show/episode200".to_string(), "mkv".to_string()), 1);
        videos.insert(("Show/episode300".to_string(), "mkv".to_string()), 1);
        assert!(!find_sequence(&videos));
    }

    #[test]
    fn dvd_video_tree_collapses_to_one_entry() {
        let p = patterns();
        let files = vec![
            f("Movie (2020)/VIDEO_TS/VIDEO_TS.IFO", 50_000),
            f("Movie (2020)/VIDEO_TS/VTS_01_0.IFO", 50_000),
            f("Movie (2020)/VIDEO_TS/VTS_01_1.VOB", 1_073_741_824),
            f("Movie (2020)/VIDEO_TS/VTS_01_2.VOB", 1_073_741_824),
        ];
        assert_eq!(classify(&files, &p).unwrap(), Category::Movies);
    }

    #[test]
    fn empty_file_list_errors() {
        let p = patterns();
        assert!(classify(&[], &p).is_err());
    }
}
