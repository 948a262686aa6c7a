//! CloudSync 解密流程实现
//!
//! 本模块负责将 CloudSync 加密文件还原为原始明文。
//!
//! 解密流程（严格顺序）：
//! 1. 读取并校验 Header（magic 不对立即失败，不做任何密码学运算）
//! 2. 解码顶层 TLV 对象流，累积 metadata 与密文 chunk
//! 3. 使用密码 + salt 解开 `enc_key1`，得到 session key
//! 4. 使用 session key（空 salt）逐个解密 chunk 并按序拼接
//! 5. 若 `compress` 非零，按 LZ4 frame 解压
//! 6. 若提供了 `file_md5`，校验明文 MD5
//!
//! 注意：
//! - 任一步失败即整体失败，不输出部分明文
//! - 每个 chunk 独立以 (session key, 空 salt) 派生 key / IV，
//!   因此所有 chunk 实际使用同一组 key / IV（格式本身如此，不可“修正”）

use std::fmt;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use lz4_flex::frame::FrameDecoder;
use md5::{Digest, Md5};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::consts::HEADER_SIZE;
use crate::crypto::cbc::{decrypt_cbc, decrypt_with_password};
use crate::crypto::kdf::{DerivedKey, EvpKdf, KeyDerivation};
use crate::error::{CloudSyncError, CryptoError, SchemaError};
use crate::format::header::Header;
use crate::format::tlv::TlvDecoder;
use crate::fs::atomic::write_atomic;
use crate::metadata::{ParsedMetadata, extract_metadata};

/// 解密流程所处阶段，失败时用于定位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadHeader,
    ParseStream,
    DeriveSessionKey,
    DecryptChunks,
    Decompress,
    VerifyChecksum,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadHeader => "read-header",
            Self::ParseStream => "parse-stream",
            Self::DeriveSessionKey => "derive-session-key",
            Self::DecryptChunks => "decrypt-chunks",
            Self::Decompress => "decompress",
            Self::VerifyChecksum => "verify-checksum",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// 文件级解密选项
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    /// 允许覆盖已存在的输出文件
    pub overwrite: bool,
}

/// 内存中的 CloudSync 解密器
///
/// 每次 [`decrypt`](Self::decrypt) 都是独立的一次运行，不缓存任何状态。
pub struct CloudSyncDecryptor<K = EvpKdf> {
    kdf: K,
}

impl CloudSyncDecryptor {
    pub fn new() -> Self {
        Self {
            kdf: EvpKdf::default(),
        }
    }
}

impl Default for CloudSyncDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KeyDerivation> CloudSyncDecryptor<K> {
    /// 使用自定义 KDF（测试中用于统计调用次数）
    pub fn with_kdf(kdf: K) -> Self {
        Self { kdf }
    }

    /// 解密完整的 CloudSync 文件内容，返回校验通过的明文
    pub fn decrypt(&self, data: &[u8], password: &[u8]) -> Result<Vec<u8>, CloudSyncError> {
        let mut stage = Stage::ReadHeader;
        let result = self.run(data, password, &mut stage);
        if let Err(e) = &result {
            warn!(%stage, error = %e, "decryption failed");
        }
        result
    }

    fn run(
        &self,
        data: &[u8],
        password: &[u8],
        stage: &mut Stage,
    ) -> Result<Vec<u8>, CloudSyncError> {
        // ---------- Header ----------
        *stage = Stage::ReadHeader;
        let header = Header::read(Cursor::new(data))?;
        debug!(digest = header.digest_hex().unwrap_or("<non-ascii>"), "header ok");

        // ---------- TLV 对象流 ----------
        *stage = Stage::ParseStream;
        let metadata = parse_stream(&data[HEADER_SIZE..])?;

        // ---------- session key ----------
        *stage = Stage::DeriveSessionKey;
        let (Some(enc_key1), Some(salt)) = (&metadata.encrypted_session_key, &metadata.salt)
        else {
            let missing = if metadata.encrypted_session_key.is_none() {
                "enc_key1"
            } else {
                "salt"
            };
            return Err(SchemaError::MissingField(missing).into());
        };
        let session_key = recover_session_key(&self.kdf, enc_key1, password, salt)?;

        // ---------- chunk 解密 ----------
        *stage = Stage::DecryptChunks;
        let mut plaintext = self.decrypt_chunks(&metadata.ciphertext_chunks, &session_key)?;

        // ---------- 解压 ----------
        if metadata.is_compressed() {
            *stage = Stage::Decompress;
            plaintext = decompress_lz4_frame(&plaintext)?;
        }

        // ---------- MD5 校验 ----------
        if let Some(expected) = &metadata.expected_md5 {
            *stage = Stage::VerifyChecksum;
            verify_md5(&plaintext, expected)?;
        }

        *stage = Stage::Done;
        debug!(len = plaintext.len(), "decryption complete");
        Ok(plaintext)
    }

    fn decrypt_chunks(
        &self,
        chunks: &[Vec<u8>],
        session_key: &[u8],
    ) -> Result<Vec<u8>, CloudSyncError> {
        let mut out = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for (index, chunk) in chunks.iter().enumerate() {
            let DerivedKey { key, iv } = self.kdf.derive(session_key, b"");
            let plain = decrypt_cbc(chunk, &key, &iv).inspect_err(|e| {
                debug!(index, len = chunk.len(), error = %e, "chunk rejected");
            })?;
            out.extend_from_slice(&plain);
        }

        debug!(chunks = chunks.len(), len = out.len(), "chunks decrypted");
        Ok(out)
    }
}

/// 解码 Header 之后的对象流
pub fn parse_stream(body: &[u8]) -> Result<ParsedMetadata, CloudSyncError> {
    let metadata = extract_metadata(TlvDecoder::with_base_offset(body, HEADER_SIZE))?;
    debug!(
        chunks = metadata.ciphertext_chunks.len(),
        compressed = metadata.is_compressed(),
        has_md5 = metadata.expected_md5.is_some(),
        "stream parsed"
    );
    Ok(metadata)
}

/// 解开 `enc_key1`
///
/// base64 字母表以外的字符（换行、空白等）先被丢弃，padding 仍然必须完整。
/// 若解密结果全部是 hex 字符，则按 hex 解码为原始字节。
pub fn recover_session_key<K: KeyDerivation>(
    kdf: &K,
    enc_key1: &str,
    password: &[u8],
    salt: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CloudSyncError> {
    let filtered: Vec<u8> = enc_key1
        .bytes()
        .filter(|&b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
        .collect();
    let encrypted = STANDARD
        .decode(&filtered)
        .map_err(|e| SchemaError::InvalidBase64 {
            field: "enc_key1",
            reason: e.to_string(),
        })?;

    let session_key = Zeroizing::new(decrypt_with_password(kdf, &encrypted, password, salt)?);

    if session_key.iter().all(u8::is_ascii_hexdigit) {
        debug!(len = session_key.len(), "session key is hex text");
        let raw = hex::decode(session_key.as_slice()).map_err(|_| CryptoError::InvalidSessionKey)?;
        return Ok(Zeroizing::new(raw));
    }

    Ok(session_key)
}

/// 解压完整的 LZ4 frame 数据
pub fn decompress_lz4_frame(data: &[u8]) -> Result<Vec<u8>, CloudSyncError> {
    let mut out = Vec::new();
    FrameDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CloudSyncError::Decompression(e.to_string()))?;
    Ok(out)
}

/// 明文 MD5 与期望值比较（忽略大小写）
pub fn verify_md5(data: &[u8], expected: &str) -> Result<(), CloudSyncError> {
    let actual = hex::encode(Md5::digest(data));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(CloudSyncError::Integrity {
            expected: expected.to_owned(),
            actual,
        });
    }
    Ok(())
}

/// 使用密码解密文件
///
/// 明文先写入临时文件，全部成功后才替换到 `output_path`。
pub fn decrypt_file(
    input_path: &Path,
    output_path: &Path,
    password: &str,
    options: &DecryptOptions,
) -> Result<(), CloudSyncError> {
    if !options.overwrite && output_path.exists() {
        return Err(CloudSyncError::AlreadyExists(output_path.to_path_buf()));
    }

    let data = fs::read(input_path)?;
    let plaintext = CloudSyncDecryptor::new().decrypt(&data, password.as_bytes())?;

    write_atomic(output_path, |file| file.write_all(&plaintext))?;

    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        len = plaintext.len(),
        "file decrypted"
    );
    Ok(())
}
