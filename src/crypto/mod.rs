pub mod cbc;
pub mod kdf;
