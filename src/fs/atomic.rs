//! 明文输出的原子写入
//!
//! 解密要么完整成功，要么不留下任何输出：
//! 明文先写入同目录下的临时文件，`sync_all` 之后再 rename 到目标路径。

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// 通过临时文件 + rename 写出 `target`
///
/// `write_fn` 返回错误时临时文件会被删除，目标文件保持原样。
pub fn write_atomic<F>(target: &Path, write_fn: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = match target.parent() {
        Some(dir) => dir,
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("output path has no parent directory: {}", target.display()),
            ));
        }
    };
    fs::create_dir_all(dir)?;

    let tmp_path = tmp_path_for(dir, target.file_name());
    let result = File::create(&tmp_path).and_then(|mut file| {
        write_fn(&mut file)?;
        file.sync_all()
    });

    if let Err(err) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    // Windows 上 rename 不会覆盖已存在的文件
    if cfg!(windows) && target.exists() {
        fs::remove_file(target)?;
    }

    if let Err(err) = fs::rename(&tmp_path, target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    debug!(target = %target.display(), "output committed");
    Ok(())
}

fn tmp_path_for(dir: &Path, file_name: Option<&OsStr>) -> PathBuf {
    let stem = file_name
        .and_then(OsStr::to_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("cloudsync-output");

    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".{stem}.{}-{seq}.partial", std::process::id()))
}
