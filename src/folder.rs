//! 目录批量解密
//!
//! Cloud Sync 会把同步目录中的每个文件单独加密、保持原有目录结构。
//!
//! 设计要点：
//! - 递归遍历目录，保持相对路径结构。
//! - 通过文件头 magic 识别加密文件，其余文件跳过。
//! - 严格校验相对路径组件，防止路径穿越写出到目标目录之外。
//! - 遇到第一个失败的文件即中止。

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::decrypt::{DecryptOptions, decrypt_file};
use crate::error::CloudSyncError;
use crate::format::header::is_cloudsync_file;

/// 目录解密统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FolderReport {
    pub decrypted: usize,
    pub skipped: usize,
}

/// 将目录中的 CloudSync 加密文件逐个解密到目标目录。
///
/// 输出文件与输入文件的相对路径相同。
pub fn decrypt_folder(
    input_path: &Path,
    output_path: &Path,
    password: &str,
    options: &DecryptOptions,
) -> Result<FolderReport, CloudSyncError> {
    if !input_path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a directory: {}", input_path.display()),
        )
        .into());
    }

    std::fs::create_dir_all(output_path)?;

    let mut report = FolderReport::default();

    for entry in WalkDir::new(input_path).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let source_path = entry.path();

        // 输出目录位于输入目录内部时，不要回头处理自己的输出
        if source_path.starts_with(output_path) && output_path != input_path {
            continue;
        }

        let target_path = mirror_path(input_path, output_path, source_path)?;

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target_path)?;
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }

        if !is_cloudsync_file(File::open(source_path)?)? {
            debug!(path = %source_path.display(), "not a CloudSync file, skipped");
            report.skipped += 1;
            continue;
        }

        decrypt_file(source_path, &target_path, password, options)?;
        report.decrypted += 1;
    }

    info!(
        decrypted = report.decrypted,
        skipped = report.skipped,
        "folder decrypted"
    );
    Ok(report)
}

/// 计算源文件在输出目录中的对应路径
///
/// 相对路径只允许普通组件；`..`、根目录、盘符一律拒绝，
/// 保证结果始终落在 `output_root` 之内。
fn mirror_path(input_root: &Path, output_root: &Path, source: &Path) -> io::Result<PathBuf> {
    let rel = source.strip_prefix(input_root).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is outside {}", source.display(), input_root.display()),
        )
    })?;

    let mut target = output_root.to_path_buf();
    for comp in rel.components() {
        match comp {
            Component::CurDir => {}
            Component::Normal(name) => target.push(name),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("refusing to mirror {}", rel.display()),
                ));
            }
        }
    }
    Ok(target)
}
