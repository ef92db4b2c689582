//! Copy a file or directory tree to an exact destination path, preferring a
//! reflink-capable `cp` and falling back to a plain recursive copy.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::errors::*;

pub fn copy(src: &Path, dst: &Path) -> Result<()> {
    if cfg!(target_os = "linux") {
        match copy_reflink(src, dst) {
            Ok(()) => return Ok(()),
            Err(ReflinkFailure::Fallback(msg)) => {
                tracing::debug!("cp fallback: {msg}");
            }
            Err(ReflinkFailure::Fatal(err)) => return Err(err),
        }
    }
    copy_fallback(src, dst)
}

enum ReflinkFailure {
    Fallback(String),
    Fatal(Error),
}

fn copy_reflink(src: &Path, dst: &Path) -> std::result::Result<(), ReflinkFailure> {
    let output = Command::new("cp")
        .args(["-d", "-f", "-R", "--reflink=auto", "-T", "--"])
        .arg(src)
        .arg(dst)
        .output();

    let output = match output {
        Ok(o) => o,
        Err(e) => return Err(ReflinkFailure::Fallback(e.to_string())),
    };

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let opt_re = regex::RegexBuilder::new(r"(unrecognized|invalid|unknown|illegal)\s+option")
        .case_insensitive(true)
        .build()
        .expect("static regex");
    if !stderr.is_empty() && !opt_re.is_match(&stderr) {
        return Err(ReflinkFailure::Fatal(anyhow!("cp failed: {stderr}")));
    }
    Err(ReflinkFailure::Fallback(stderr))
}

fn copy_fallback(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        copy_dir_recursive(src, dst)
            .with_context(|| format!("copying directory {} to {}", src.display(), dst.display()))
    } else {
        fs::create_dir_all(dst.parent().unwrap_or_else(|| Path::new(".")))?;
        fs::copy(src, dst)
            .with_context(|| format!("copying file {} to {}", src.display(), dst.display()))?;
        let mode = fs::metadata(src)?.permissions();
        fs::set_permissions(dst, mode)?;
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if file_type.is_symlink() {
            let target = fs::read_link(&src_path)?;
            if dst_path.exists() || dst_path.is_symlink() {
                fs::remove_file(&dst_path).ok();
            }
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dst_path)?;
            #[cfg(not(unix))]
            fs::copy(&src_path, &dst_path)?;
        } else if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
            let mode = fs::metadata(&src_path)?.permissions();
            fs::set_permissions(&dst_path, mode)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_single_file() {
        let dir = tempdir();
        let src = dir.join("src.txt");
        let dst = dir.join("dst.txt");
        fs::write(&src, b"hello").unwrap();
        copy(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"hello");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn copy_directory_tree() {
        let dir = tempdir();
        let src = dir.join("srcdir");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();
        fs::write(src.join("nested/b.txt"), b"b").unwrap();
        let dst = dir.join("dstdir");
        copy(&src, &dst).unwrap();
        assert_eq!(fs::read(dst.join("a.txt")).unwrap(), b"a");
        assert_eq!(fs::read(dst.join("nested/b.txt")).unwrap(), b"b");
        fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("seedhelper-copy-test-{:?}", std::thread::current().id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
