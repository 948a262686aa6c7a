//! CloudSync 加密文件格式常量
//!
//! 所有字节布局相关的常量集中在这里，
//! header / tlv / crypto 模块只引用、不重复定义。

/// CloudSync 文件魔数（ASCII，17 字节）
pub const MAGIC: &[u8; 17] = b"__CLOUDSYNC_ENC__";

/// magic 之后的 ASCII-hex MD5 字段长度
pub const DIGEST_FIELD_SIZE: usize = 32;

/// 17 (magic) + 32 (hex digest)
pub const HEADER_SIZE: usize = MAGIC.len() + DIGEST_FIELD_SIZE;

// TLV 类型字节
pub const TLV_DICT_START: u8 = 0x42;
pub const TLV_DICT_END: u8 = 0x40;
pub const TLV_STRING: u8 = 0x10;
pub const TLV_BYTES: u8 = 0x11;
pub const TLV_INT: u8 = 0x01;

/// 字典最大嵌套层数，防止恶意输入导致栈溢出
pub const TLV_MAX_DEPTH: usize = 64;

pub const AES_BLOCK_SIZE: usize = 16;

/// EVP_BytesToKey 默认输出：AES-256 key + CBC IV
pub const KDF_KEY_SIZE: usize = 32;
pub const KDF_IV_SIZE: usize = 16;

/// 有 salt 时的 MD5 迭代次数
pub const KDF_SALTED_ITERATIONS: u32 = 1000;
/// 无 salt 时只做一次 MD5
pub const KDF_UNSALTED_ITERATIONS: u32 = 1;
