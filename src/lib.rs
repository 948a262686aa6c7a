mod decrypt;
mod folder;

pub mod consts;
pub mod crypto;
pub mod error;
pub mod format;
pub mod fs;
pub mod metadata;

pub use decrypt::{
    CloudSyncDecryptor, DecryptOptions, Stage, decompress_lz4_frame, parse_stream,
    recover_session_key, verify_md5,
};
pub use error::{CloudSyncError, CryptoError, FormatError, SchemaError};
pub use folder::FolderReport;

use std::path::Path;

/// 解密单个 CloudSync 文件（不覆盖已存在的输出）
pub fn decrypt(input: &Path, output: &Path, password: &str) -> Result<(), CloudSyncError> {
    decrypt::decrypt_file(input, output, password, &DecryptOptions::default())
}

pub fn decrypt_with_options(
    input: &Path,
    output: &Path,
    password: &str,
    options: &DecryptOptions,
) -> Result<(), CloudSyncError> {
    decrypt::decrypt_file(input, output, password, options)
}

/// 解密内存中的 CloudSync 文件内容
pub fn decrypt_bytes(data: &[u8], password: &str) -> Result<Vec<u8>, CloudSyncError> {
    CloudSyncDecryptor::new().decrypt(data, password.as_bytes())
}

pub fn decrypt_folder(
    input: &Path,
    output: &Path,
    password: &str,
    options: &DecryptOptions,
) -> Result<FolderReport, CloudSyncError> {
    folder::decrypt_folder(input, output, password, options)
}
