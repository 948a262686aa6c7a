//! 顶层对象 → 解密参数
//!
//! CloudSync 的顶层 TLV 对象都是字典，以 `"type"` 字段区分：
//!
//! - `"metadata"`：`enc_key1` / `salt` / `compress` / `file_md5`
//! - `"data"`：`data` 字段为一段密文 chunk
//! - 其余对象一律忽略
//!
//! 字段类型严格校验：字段存在但类型不对即报错，
//! 唯一例外是 `salt` 同时接受字符串与字节。

use tracing::trace;

use crate::error::{CloudSyncError, SchemaError};
use crate::format::tlv::{TlvMap, TlvValue};

/// 从对象流中累积得到的解密参数
#[derive(Debug, Clone, Default)]
pub struct ParsedMetadata {
    /// base64 编码的加密 session key（`enc_key1`）
    pub encrypted_session_key: Option<String>,
    pub salt: Option<Vec<u8>>,
    /// 非零表示明文为 LZ4 frame 压缩数据
    pub compress_flag: u64,
    pub expected_md5: Option<String>,
    /// 按出现顺序排列的密文 chunk
    pub ciphertext_chunks: Vec<Vec<u8>>,
}

impl ParsedMetadata {
    pub fn is_compressed(&self) -> bool {
        self.compress_flag != 0
    }
}

#[derive(Debug, Default)]
pub struct MetadataExtractor {
    metadata: ParsedMetadata,
    objects_seen: usize,
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一个顶层对象
    pub fn ingest(&mut self, object: TlvValue) -> Result<(), CloudSyncError> {
        self.objects_seen += 1;

        let mut map = match object {
            TlvValue::Map(map) => map,
            other => {
                trace!(kind = other.type_name(), "ignoring non-dictionary object");
                return Ok(());
            }
        };

        match map.get_str("type").and_then(TlvValue::as_str) {
            Some("metadata") => self.ingest_metadata(&map),
            Some("data") => self.ingest_data(&mut map),
            other => {
                trace!(kind = ?other, "ignoring object");
                Ok(())
            }
        }
    }

    pub fn objects_seen(&self) -> usize {
        self.objects_seen
    }

    pub fn finish(self) -> ParsedMetadata {
        self.metadata
    }

    fn ingest_metadata(&mut self, map: &TlvMap) -> Result<(), CloudSyncError> {
        if let Some(value) = map.get_str("enc_key1") {
            let TlvValue::String(s) = value else {
                return Err(wrong_type("enc_key1", "a string", value));
            };
            self.metadata.encrypted_session_key = Some(s.clone());
        }

        if let Some(value) = map.get_str("salt") {
            self.metadata.salt = Some(salt_bytes(value)?);
        }

        if let Some(value) = map.get_str("compress") {
            let TlvValue::Integer(n) = value else {
                return Err(wrong_type("compress", "an integer", value));
            };
            self.metadata.compress_flag = n.to_u64().unwrap_or(u64::MAX);
        }

        if let Some(value) = map.get_str("file_md5") {
            let TlvValue::String(s) = value else {
                return Err(wrong_type("file_md5", "a string", value));
            };
            // 空字符串等同于未提供
            self.metadata.expected_md5 = (!s.is_empty()).then(|| s.clone());
        }

        Ok(())
    }

    fn ingest_data(&mut self, map: &mut TlvMap) -> Result<(), CloudSyncError> {
        match map.remove_str("data") {
            None => Ok(()),
            Some(value) if is_empty_value(&value) => Ok(()),
            Some(TlvValue::Bytes(chunk)) => {
                trace!(len = chunk.len(), "data chunk");
                self.metadata.ciphertext_chunks.push(chunk);
                Ok(())
            }
            Some(other) => Err(wrong_type("data chunk", "bytes", &other)),
        }
    }
}

/// 依次处理所有对象，遇到第一个错误即停止
pub fn extract_metadata<I>(objects: I) -> Result<ParsedMetadata, CloudSyncError>
where
    I: IntoIterator<Item = Result<TlvValue, CloudSyncError>>,
{
    let mut extractor = MetadataExtractor::new();
    for object in objects {
        extractor.ingest(object?)?;
    }
    Ok(extractor.finish())
}

/// salt 字符串按 Latin-1 转为字节（每个字符 ≤ U+00FF）
fn salt_bytes(value: &TlvValue) -> Result<Vec<u8>, CloudSyncError> {
    match value {
        TlvValue::Bytes(b) => Ok(b.clone()),
        TlvValue::String(s) => s
            .chars()
            .map(|c| u8::try_from(u32::from(c)).map_err(|_| SchemaError::NotLatin1 { field: "salt" }))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(Into::into),
        other => Err(wrong_type("salt", "a string or bytes", other)),
    }
}

fn is_empty_value(value: &TlvValue) -> bool {
    match value {
        TlvValue::Absent => true,
        TlvValue::Bytes(b) => b.is_empty(),
        TlvValue::String(s) => s.is_empty(),
        TlvValue::Integer(n) => n.is_zero(),
        TlvValue::Map(m) => m.is_empty(),
    }
}

fn wrong_type(field: &'static str, expected: &'static str, found: &TlvValue) -> CloudSyncError {
    SchemaError::WrongType {
        field,
        expected,
        found: found.type_name(),
    }
    .into()
}
