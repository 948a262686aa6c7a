//! CloudSync 加密文件 Header
//!
//! Header 为固定结构：
//!
//! 17 (magic `__CLOUDSYNC_ENC__`)
//! 32 (ASCII-hex MD5)
//!
//! 之后即为顶层 TLV 对象序列。
//!
//! 注意：
//! - magic 不匹配必须在任何密码学运算之前报错
//! - 32 字节 digest 字段只保留、不校验

use std::io::{ErrorKind, Read};

use crate::consts::{DIGEST_FIELD_SIZE, MAGIC};
use crate::error::{CloudSyncError, FormatError};

#[derive(Debug, Clone)]
pub struct Header {
    /// magic 之后的 32 字节 hex digest，原样保留
    pub digest_field: [u8; DIGEST_FIELD_SIZE],
}

impl Header {
    /// 从输入流读取并校验 Header
    ///
    /// 读取完成后 reader 恰好停在第一个 TLV 对象处。
    pub fn read<R: Read>(mut reader: R) -> Result<Self, CloudSyncError> {
        let mut magic = [0u8; MAGIC.len()];
        read_exact_or(&mut reader, &mut magic, FormatError::BadMagic)?;

        if &magic != MAGIC {
            return Err(FormatError::BadMagic.into());
        }

        let mut digest_field = [0u8; DIGEST_FIELD_SIZE];
        read_exact_or(&mut reader, &mut digest_field, FormatError::TruncatedHeader)?;

        Ok(Self { digest_field })
    }

    /// digest 字段的文本形式（非 ASCII 时返回 None）
    pub fn digest_hex(&self) -> Option<&str> {
        std::str::from_utf8(&self.digest_field)
            .ok()
            .filter(|s| s.is_ascii())
    }
}

/// 只检查 magic 前缀，用于目录模式下筛选待解密文件
pub fn is_cloudsync_file<R: Read>(mut reader: R) -> std::io::Result<bool> {
    let mut magic = [0u8; MAGIC.len()];
    match reader.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == MAGIC),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_exact_or<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    on_eof: FormatError,
) -> Result<(), CloudSyncError> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(on_eof.into()),
        Err(e) => Err(e.into()),
    }
}
