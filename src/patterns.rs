//! Loads the category pattern table (extension sets and regexes) used by the
//! classifier, and memoizes regex tests behind a bounded LRU.

use std::cell::RefCell;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;

use lru::LruCache;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::errors::*;

#[derive(Debug, Deserialize)]
struct RawPatterns {
    video_exts: Vec<String>,
    audio_exts: Vec<String>,
    archive_exts: Vec<String>,
    av_regex: String,
    tv_regex: String,
    movie_regex: String,
}

struct LazyPattern {
    source: String,
    compiled: RefCell<Option<Regex>>,
    cache: RefCell<LruCache<String, bool>>,
}

impl LazyPattern {
    fn new(source: String, cache_size: usize) -> Self {
        Self {
            source,
            compiled: RefCell::new(None),
            cache: RefCell::new(LruCache::new(NonZeroUsize::new(cache_size).unwrap())),
        }
    }

    fn test(&self, normalized: &str) -> bool {
        if let Some(&hit) = self.cache.borrow_mut().get(normalized) {
            return hit;
        }
        if self.compiled.borrow().is_none() {
            let re = RegexBuilder::new(&self.source)
                .case_insensitive(true)
                .unicode(false)
                .build()
                .expect("pattern file regex failed to compile");
            *self.compiled.borrow_mut() = Some(re);
        }
        let result = self.compiled.borrow().as_ref().unwrap().is_match(normalized);
        self.cache.borrow_mut().put(normalized.to_string(), result);
        result
    }
}

/// Compiled category patterns, loaded once per process.
pub struct PatternStore {
    pub video_exts: HashSet<String>,
    pub audio_exts: HashSet<String>,
    pub archive_exts: HashSet<String>,
    av: LazyPattern,
    tv: LazyPattern,
    movie: LazyPattern,
}

impl PatternStore {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading pattern file {}", path.display()))?;
        let raw: RawPatterns = serde_json::from_str(&data)
            .with_context(|| format!("parsing pattern file {}", path.display()))?;

        if raw.video_exts.is_empty() || raw.audio_exts.is_empty() || raw.archive_exts.is_empty() {
            bail!("empty extension set in pattern file: {}", path.display());
        }

        let video_exts: HashSet<String> = raw.video_exts.into_iter().collect();
        let audio_exts: HashSet<String> = raw.audio_exts.into_iter().collect();
        let archive_exts: HashSet<String> = raw.archive_exts.into_iter().collect();

        if !video_exts.is_disjoint(&audio_exts)
            || !video_exts.is_disjoint(&archive_exts)
            || !audio_exts.is_disjoint(&archive_exts)
        {
            bail!("extension sets overlap in pattern file: {}", path.display());
        }

        Ok(Self {
            video_exts,
            audio_exts,
            archive_exts,
            av: LazyPattern::new(raw.av_regex, 1024),
            tv: LazyPattern::new(raw.tv_regex, 512),
            movie: LazyPattern::new(raw.movie_regex, 512),
        })
    }

    pub fn is_av(&self, normalized: &str) -> bool {
        self.av.test(normalized)
    }

    pub fn is_tv(&self, normalized: &str) -> bool {
        self.tv.test(normalized)
    }

    pub fn is_movie(&self, normalized: &str) -> bool {
        self.movie.test(normalized)
    }
}
