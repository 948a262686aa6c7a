//! CloudSync TLV 解码器
//!
//! CloudSync 文件在 Header 之后是一串自描述的 TLV 对象：
//!
//! - `0x42` 字典开始，随后交替出现 key / value，直到遇到 `0x40` 或数据耗尽
//! - `0x40` 字典结束
//! - `0x10` UTF-8 字符串，2 字节大端长度
//! - `0x11` 原始字节，2 字节大端长度
//! - `0x01` 无符号大端整数，1 字节长度
//!
//! 注意：
//! - “数据耗尽” 与 “遇到 0x40” 对外表现完全一致，都返回 [`TlvValue::Absent`]
//! - 字典保持插入顺序
//! - 本模块只解码，不提供编码

use crate::consts::{TLV_BYTES, TLV_DICT_END, TLV_DICT_START, TLV_INT, TLV_MAX_DEPTH, TLV_STRING};
use crate::error::{CloudSyncError, FormatError, SchemaError};

/// 解码得到的动态类型值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvValue {
    /// 数据耗尽或字典结束标记
    Absent,
    Map(TlvMap),
    String(String),
    Bytes(Vec<u8>),
    Integer(TlvInteger),
}

impl TlvValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Map(_) => "dictionary",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Integer(_) => "integer",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_map(&self) -> Option<&TlvMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<&TlvInteger> {
        match self {
            Self::Integer(n) => Some(n),
            _ => None,
        }
    }
}

/// 字典 key：只允许字符串、字节、整数
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TlvKey {
    String(String),
    Bytes(Vec<u8>),
    Integer(TlvInteger),
}

impl From<&str> for TlvKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

/// 任意长度的无符号大端整数
///
/// 内部去掉了前导零，因此 `01 05` 与 `05` 相等。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TlvInteger {
    digits: Vec<u8>,
}

impl TlvInteger {
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        Self {
            digits: bytes[first..].to_vec(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    /// 超过 64 位时返回 None
    pub fn to_u64(&self) -> Option<u64> {
        if self.digits.len() > 8 {
            return None;
        }
        Some(self.digits.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }

    /// 去掉前导零后的大端字节
    pub fn as_be_bytes(&self) -> &[u8] {
        &self.digits
    }
}

impl From<u64> for TlvInteger {
    fn from(n: u64) -> Self {
        Self::from_be_bytes(&n.to_be_bytes())
    }
}

/// 保持插入顺序的字典
///
/// 重复 key 时后值覆盖前值，但位置保持第一次出现的位置。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvMap {
    entries: Vec<(TlvKey, TlvValue)>,
}

impl TlvMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TlvKey, value: TlvValue) -> Option<TlvValue> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &TlvKey) -> Option<&TlvValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// 按字符串 key 查找（最常见的用法）
    pub fn get_str(&self, key: &str) -> Option<&TlvValue> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, TlvKey::String(s) if s == key))
            .map(|(_, v)| v)
    }

    /// 按字符串 key 取出值（用于移动大块字节，避免拷贝）
    pub fn remove_str(&mut self, key: &str) -> Option<TlvValue> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| matches!(k, TlvKey::String(s) if s == key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TlvKey, &TlvValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

// 解码内部使用：区分两种结束原因，对外再合并为 Absent
enum Token {
    EndOfStream,
    EndOfMap,
    Value(TlvValue),
}

/// 基于字节切片的 TLV 解码器
///
/// 错误中的 offset 为 `base_offset + 切片内位置`，
/// 便于直接对照整个文件定位问题。
pub struct TlvDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    base_offset: usize,
    fused: bool,
}

impl<'a> TlvDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base_offset(data, 0)
    }

    pub fn with_base_offset(data: &'a [u8], base_offset: usize) -> Self {
        Self {
            data,
            pos: 0,
            base_offset,
            fused: false,
        }
    }

    /// 当前绝对偏移
    pub fn offset(&self) -> usize {
        self.base_offset + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// 从当前位置解码恰好一个值
    ///
    /// 数据耗尽或遇到 `0x40` 时返回 [`TlvValue::Absent`]。
    pub fn decode_next(&mut self) -> Result<TlvValue, CloudSyncError> {
        match self.next_token(0)? {
            Token::Value(value) => Ok(value),
            Token::EndOfStream | Token::EndOfMap => Ok(TlvValue::Absent),
        }
    }

    fn next_token(&mut self, depth: usize) -> Result<Token, CloudSyncError> {
        let tag_offset = self.offset();
        let Some(&tag) = self.data.get(self.pos) else {
            return Ok(Token::EndOfStream);
        };
        self.pos += 1;

        let value = match tag {
            TLV_DICT_START => {
                if depth >= TLV_MAX_DEPTH {
                    return Err(FormatError::NestingTooDeep {
                        offset: tag_offset,
                        limit: TLV_MAX_DEPTH,
                    }
                    .into());
                }
                TlvValue::Map(self.read_map(depth + 1)?)
            }
            TLV_DICT_END => return Ok(Token::EndOfMap),
            TLV_STRING => {
                let len = self.read_len_u16()?;
                let body_offset = self.offset();
                let raw = self.take(len)?;
                let s = std::str::from_utf8(raw)
                    .map_err(|_| FormatError::InvalidUtf8 { offset: body_offset })?;
                TlvValue::String(s.to_owned())
            }
            TLV_BYTES => {
                let len = self.read_len_u16()?;
                TlvValue::Bytes(self.take(len)?.to_vec())
            }
            TLV_INT => {
                let len = usize::from(self.take(1)?[0]);
                TlvValue::Integer(TlvInteger::from_be_bytes(self.take(len)?))
            }
            other => {
                return Err(FormatError::UnknownTag {
                    tag: other,
                    offset: tag_offset,
                }
                .into());
            }
        };

        Ok(Token::Value(value))
    }

    fn read_map(&mut self, depth: usize) -> Result<TlvMap, CloudSyncError> {
        let mut map = TlvMap::new();

        loop {
            let key_offset = self.offset();
            let key = match self.next_token(depth)? {
                Token::EndOfStream | Token::EndOfMap => break,
                Token::Value(TlvValue::String(s)) => TlvKey::String(s),
                Token::Value(TlvValue::Bytes(b)) => TlvKey::Bytes(b),
                Token::Value(TlvValue::Integer(n)) => TlvKey::Integer(n),
                Token::Value(other) => {
                    return Err(SchemaError::InvalidMapKey {
                        offset: key_offset,
                        found: other.type_name(),
                    }
                    .into());
                }
            };

            let value = match self.next_token(depth)? {
                Token::Value(value) => value,
                Token::EndOfStream | Token::EndOfMap => TlvValue::Absent,
            };

            map.insert(key, value);
        }

        Ok(map)
    }

    fn read_len_u16(&mut self) -> Result<usize, FormatError> {
        let raw = self.take(2)?;
        Ok(usize::from(u16::from_be_bytes([raw[0], raw[1]])))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        let available = self.remaining();
        if n > available {
            return Err(FormatError::Truncated {
                offset: self.offset(),
                needed: n,
                available,
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }
}

/// 逐个产出顶层对象，遇到 Absent 结束；出错后不再产出
impl Iterator for TlvDecoder<'_> {
    type Item = Result<TlvValue, CloudSyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.decode_next() {
            Ok(TlvValue::Absent) => {
                self.fused = true;
                None
            }
            Ok(value) => Some(Ok(value)),
            Err(e) => {
                self.fused = true;
                Some(Err(e))
            }
        }
    }
}
