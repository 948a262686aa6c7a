//! CloudSync 文件格式：Header + 顶层 TLV 对象流

pub mod header;
pub mod tlv;
