use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudSyncError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("MD5 mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("LZ4 decompression failed: {0}")]
    Decompression(String),

    #[error("output already exists: {0}")]
    AlreadyExists(PathBuf),
}

/// 容器字节布局层面的错误（magic、TLV 编码）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("not a CloudSync encrypted file")]
    BadMagic,

    #[error("header truncated before the digest field ends")]
    TruncatedHeader,

    #[error("truncated stream at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("unknown type byte 0x{tag:02X} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("dictionaries nested deeper than {limit} levels at offset {offset}")]
    NestingTooDeep { offset: usize, limit: usize },
}

/// 解码成功但对象结构 / 字段类型不符合预期
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{field} must be {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("dictionary key at offset {offset} cannot be {found}")]
    InvalidMapKey { offset: usize, found: &'static str },

    #[error("missing encryption metadata: {0}")]
    MissingField(&'static str),

    #[error("{field} is not valid base64: {reason}")]
    InvalidBase64 { field: &'static str, reason: String },

    #[error("{field} contains characters outside Latin-1")]
    NotLatin1 { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("ciphertext length {len} is not a nonzero multiple of 16")]
    Unaligned { len: usize },

    #[error("invalid padding length: {0}")]
    InvalidPadLength(u8),

    #[error("invalid PKCS7 padding")]
    InvalidPadding,

    #[error("invalid key or IV length")]
    InvalidKeyLength,

    #[error("session key is not valid hex")]
    InvalidSessionKey,
}
