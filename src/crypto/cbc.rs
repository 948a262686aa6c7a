//! AES-256-CBC 解密 + 严格 PKCS7 去填充
//!
//! - 密文长度必须是 16 的非零倍数
//! - 填充长度必须在 1..=16 之间，且每个填充字节都要校验
//! - 填充不合法一律报错，不做任何“尽力恢复”

use aes::Aes256;
use cbc::Decryptor;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};

use crate::consts::AES_BLOCK_SIZE;
use crate::crypto::kdf::{DerivedKey, KeyDerivation};
use crate::error::{CloudSyncError, CryptoError};

type Aes256CbcDec = Decryptor<Aes256>;

/// 使用给定 key / IV 解密并去除 PKCS7 填充
pub fn decrypt_cbc(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CloudSyncError> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::Unaligned {
            len: ciphertext.len(),
        }
        .into());
    }

    let cipher =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength)?;

    let mut buffer = ciphertext.to_vec();
    let plain_len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| CryptoError::Unaligned {
            len: ciphertext.len(),
        })?
        .len();
    buffer.truncate(plain_len);

    let unpadded = strip_pkcs7_padding(&buffer)?.len();
    buffer.truncate(unpadded);
    Ok(buffer)
}

/// 先用 KDF 从 (password, salt) 派生 key / IV，再解密
pub fn decrypt_with_password<K: KeyDerivation>(
    kdf: &K,
    ciphertext: &[u8],
    password: &[u8],
    salt: &[u8],
) -> Result<Vec<u8>, CloudSyncError> {
    let DerivedKey { key, iv } = kdf.derive(password, salt);
    decrypt_cbc(ciphertext, &key, &iv)
}

/// 校验并去除 PKCS7 填充，返回去填充后的切片
pub fn strip_pkcs7_padding(data: &[u8]) -> Result<&[u8], CryptoError> {
    if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::Unaligned { len: data.len() });
    }

    let pad_len = data[data.len() - 1];
    if pad_len == 0 || usize::from(pad_len) > AES_BLOCK_SIZE {
        return Err(CryptoError::InvalidPadLength(pad_len));
    }

    let (body, padding) = data.split_at(data.len() - usize::from(pad_len));
    if padding.iter().any(|&b| b != pad_len) {
        return Err(CryptoError::InvalidPadding);
    }

    Ok(body)
}
