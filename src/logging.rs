//! `tracing` subscriber wiring: a console layer plus a size-rotated file
//! layer, in lieu of a `RotatingFileHandler` equivalent in the ecosystem.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::errors::*;

const MAX_BYTES: u64 = 10 * 1024 * 1024;
const BACKUPS: u32 = 3;

struct RotatingFile {
    path: PathBuf,
    inner: Mutex<File>,
}

impl RotatingFile {
    fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self { path, inner: Mutex::new(file) })
    }

    fn rotate_if_needed(&self, guard: &mut File) {
        let size = guard.metadata().map(|m| m.len()).unwrap_or(0);
        if size < MAX_BYTES {
            return;
        }
        for i in (1..BACKUPS).rev() {
            let from = backup_path(&self.path, i);
            let to = backup_path(&self.path, i + 1);
            if from.exists() {
                let _ = fs::rename(from, to);
            }
        }
        let _ = fs::rename(&self.path, backup_path(&self.path, 1));
        if let Ok(new_file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            *guard = new_file;
        }
    }
}

fn backup_path(path: &std::path::Path, n: u32) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(format!(".{n}"));
    PathBuf::from(s)
}

struct RotatingWriter<'a>(&'a RotatingFile);

impl Write for RotatingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.0.inner.lock().unwrap();
        self.0.rotate_if_needed(&mut guard);
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.inner.lock().unwrap().flush()
    }
}

impl<'a> MakeWriter<'a> for RotatingFile {
    type Writer = RotatingWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        RotatingWriter(self)
    }
}

/// Installs a global subscriber with a console layer and a size-rotated
/// file layer. `level` is one of DEBUG/INFO/WARNING/ERROR/CRITICAL as
/// accepted by the config schema; CRITICAL maps to tracing's ERROR.
pub fn init(log_file: &std::path::Path, level: &str) -> Result<()> {
    let level = match level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    };

    let rotating = RotatingFile::open(log_file.to_path_buf())?;

    let console_layer = tracing_subscriber::fmt::layer().with_ansi(true);
    let file_layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(rotating);

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_triggers_past_threshold() {
        let dir = std::env::temp_dir().join("seedhelper-logtest");
        fs::create_dir_all(&dir).ok();
        let path = dir.join("logfile.log");
        fs::remove_file(&path).ok();
        let rf = RotatingFile::open(path.clone()).unwrap();
        {
            let mut guard = rf.inner.lock().unwrap();
            guard.write_all(&vec![b'a'; (MAX_BYTES + 1) as usize]).unwrap();
        }
        {
            let mut guard = rf.inner.lock().unwrap();
            rf.rotate_if_needed(&mut guard);
        }
        assert!(backup_path(&path, 1).exists());
        fs::remove_dir_all(&dir).ok();
    }
}
