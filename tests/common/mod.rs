//! 测试辅助：手工构造 TLV 字节流与完整的 CloudSync 文件
#![allow(dead_code)]

use std::cell::Cell;
use std::io::Write;

use aes::Aes256;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use cbc::Encryptor;
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use lz4_flex::frame::FrameEncoder;
use md5::{Digest, Md5};

use cloudsync_decrypt::consts::MAGIC;
use cloudsync_decrypt::crypto::kdf::{DerivedKey, EvpKdf, KeyDerivation, evp_bytes_to_key};

pub const PASSWORD: &str = "correct horse battery staple";
pub const SALT: &[u8] = b"Nf3kx9Qa";

/// hex 文本形式的 session key（真实 CloudSync 文件即如此）
pub const SESSION_KEY_HEX: &[u8] =
    b"6b1f0c2d9e8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c";

pub fn tlv_str(s: &str) -> Vec<u8> {
    let mut out = vec![0x10];
    out.extend_from_slice(&(s.len() as u16).to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    out
}

pub fn tlv_bytes(b: &[u8]) -> Vec<u8> {
    let mut out = vec![0x11];
    out.extend_from_slice(&(b.len() as u16).to_be_bytes());
    out.extend_from_slice(b);
    out
}

pub fn tlv_int_raw(be: &[u8]) -> Vec<u8> {
    let mut out = vec![0x01, be.len() as u8];
    out.extend_from_slice(be);
    out
}

pub fn tlv_int(n: u64) -> Vec<u8> {
    let be = n.to_be_bytes();
    let first = be.iter().position(|&b| b != 0).unwrap_or(be.len() - 1);
    tlv_int_raw(&be[first..])
}

/// `0x42 (key value)* 0x40`
pub fn tlv_map(entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut out = vec![0x42];
    for (k, v) in entries {
        out.extend_from_slice(k);
        out.extend_from_slice(v);
    }
    out.push(0x40);
    out
}

/// magic + 32 字节 hex digest + 对象流
pub fn container(objects: &[Vec<u8>]) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(b"0123456789abcdef0123456789abcdef");
    for obj in objects {
        out.extend_from_slice(obj);
    }
    out
}

/// 独立的参考加密实现：AES-256-CBC + PKCS7
pub fn encrypt_cbc(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Vec<u8> {
    Encryptor::<Aes256>::new_from_slices(key, iv)
        .expect("key / iv length")
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

pub fn encrypt_with_password(plaintext: &[u8], password: &[u8], salt: &[u8]) -> Vec<u8> {
    let derived = evp_bytes_to_key(password, salt, 32, 16);
    encrypt_cbc(plaintext, &derived.key, &derived.iv)
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

pub fn lz4_frame(data: &[u8]) -> Vec<u8> {
    let mut encoder = FrameEncoder::new(Vec::new());
    encoder.write_all(data).expect("lz4 write");
    encoder.finish().expect("lz4 finish")
}

/// 构造一个完整 CloudSync 文件所需的参数
pub struct Fixture {
    pub password: Vec<u8>,
    pub salt: Vec<u8>,
    /// `enc_key1` 解密后的内容
    pub session_key: Vec<u8>,
    pub compress: u64,
    pub file_md5: Option<String>,
    /// 每个 chunk 加密前的明文
    pub chunks: Vec<Vec<u8>>,
}

impl Fixture {
    pub fn new(chunks: &[&[u8]]) -> Self {
        Self {
            password: PASSWORD.as_bytes().to_vec(),
            salt: SALT.to_vec(),
            session_key: SESSION_KEY_HEX.to_vec(),
            compress: 0,
            file_md5: None,
            chunks: chunks.iter().map(|c| c.to_vec()).collect(),
        }
    }

    /// chunk 实际使用的 session key（hex 文本会先解码）
    pub fn effective_session_key(&self) -> Vec<u8> {
        if self.session_key.iter().all(u8::is_ascii_hexdigit) {
            hex::decode(&self.session_key).expect("even-length hex session key")
        } else {
            self.session_key.clone()
        }
    }

    pub fn enc_key1(&self) -> String {
        STANDARD.encode(encrypt_with_password(
            &self.session_key,
            &self.password,
            &self.salt,
        ))
    }

    pub fn metadata_object(&self) -> Vec<u8> {
        let mut entries = vec![
            (tlv_str("type"), tlv_str("metadata")),
            (tlv_str("enc_key1"), tlv_str(&self.enc_key1())),
            (tlv_str("salt"), tlv_bytes(&self.salt)),
            (tlv_str("compress"), tlv_int(self.compress)),
        ];
        if let Some(md5) = &self.file_md5 {
            entries.push((tlv_str("file_md5"), tlv_str(md5)));
        }
        tlv_map(&entries)
    }

    pub fn encrypted_chunks(&self) -> Vec<Vec<u8>> {
        let session_key = self.effective_session_key();
        self.chunks
            .iter()
            .map(|c| encrypt_with_password(c, &session_key, b""))
            .collect()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut objects = vec![self.metadata_object()];
        for chunk in self.encrypted_chunks() {
            objects.push(data_object(&chunk));
        }
        container(&objects)
    }
}

pub fn data_object(chunk: &[u8]) -> Vec<u8> {
    tlv_map(&[
        (tlv_str("type"), tlv_str("data")),
        (tlv_str("data"), tlv_bytes(chunk)),
    ])
}

/// 统计调用次数的 KDF 替身
#[derive(Default)]
pub struct CountingKdf {
    pub calls: Cell<usize>,
    inner: EvpKdf,
}

impl KeyDerivation for CountingKdf {
    fn derive(&self, password: &[u8], salt: &[u8]) -> DerivedKey {
        self.calls.set(self.calls.get() + 1);
        self.inner.derive(password, salt)
    }
}
