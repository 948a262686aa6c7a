//! CloudSync 密钥派生函数（KDF）模块
//!
//! CloudSync 使用 OpenSSL `EVP_BytesToKey` 风格的 MD5 KDF，
//! 将密码与 salt 扩展为 AES-256 key + CBC IV。
//!
//! 算法：
//! - 迭代次数：salt 为空时 1 次，否则 1000 次
//! - 每一轮：D_i = MD5^count(D_{i-1} || password || salt)
//! - 依次拼接 D_1, D_2, ... 直到长度 ≥ key_size + iv_size
//!
//! 该算法必须与旧实现逐字节一致，
//! 包括依赖 salt 是否为空的迭代次数切换。

use md5::{Digest, Md5};
use zeroize::Zeroizing;

use crate::consts::{KDF_IV_SIZE, KDF_KEY_SIZE, KDF_SALTED_ITERATIONS, KDF_UNSALTED_ITERATIONS};

/// 派生结果（离开作用域后自动清零）
pub struct DerivedKey {
    pub key: Zeroizing<Vec<u8>>,
    pub iv: Zeroizing<Vec<u8>>,
}

/// 密码 + salt → key / IV
///
/// 解密流程只依赖该 trait，便于在测试中替换实现。
pub trait KeyDerivation {
    fn derive(&self, password: &[u8], salt: &[u8]) -> DerivedKey;
}

impl<K: KeyDerivation + ?Sized> KeyDerivation for &K {
    fn derive(&self, password: &[u8], salt: &[u8]) -> DerivedKey {
        (**self).derive(password, salt)
    }
}

/// `EVP_BytesToKey`（MD5）实现
#[derive(Debug, Clone, Copy)]
pub struct EvpKdf {
    pub key_size: usize,
    pub iv_size: usize,
}

impl Default for EvpKdf {
    fn default() -> Self {
        Self {
            key_size: KDF_KEY_SIZE,
            iv_size: KDF_IV_SIZE,
        }
    }
}

impl KeyDerivation for EvpKdf {
    fn derive(&self, password: &[u8], salt: &[u8]) -> DerivedKey {
        evp_bytes_to_key(password, salt, self.key_size, self.iv_size)
    }
}

/// 根据 salt 决定 MD5 迭代次数
pub fn iteration_count(salt: &[u8]) -> u32 {
    if salt.is_empty() {
        KDF_UNSALTED_ITERATIONS
    } else {
        KDF_SALTED_ITERATIONS
    }
}

/// 派生 `key_size` 字节 key 与 `iv_size` 字节 IV
pub fn evp_bytes_to_key(
    password: &[u8],
    salt: &[u8],
    key_size: usize,
    iv_size: usize,
) -> DerivedKey {
    let count = iteration_count(salt);
    let total = key_size + iv_size;

    let mut material = Zeroizing::new(Vec::with_capacity(total + 16));
    let mut prev = Zeroizing::new(Vec::new());

    while material.len() < total {
        let mut hasher = Md5::new();
        hasher.update(prev.as_slice());
        hasher.update(password);
        hasher.update(salt);
        let mut digest = hasher.finalize();

        for _ in 1..count {
            digest = Md5::digest(digest.as_slice());
        }

        material.extend_from_slice(&digest);
        prev.clear();
        prev.extend_from_slice(&digest);
    }

    DerivedKey {
        key: Zeroizing::new(material[..key_size].to_vec()),
        iv: Zeroizing::new(material[key_size..total].to_vec()),
    }
}
