//! Codec layer for encryption and compression operations.
//!
//! # Submodules
//!
//! - [`crypto`]: Encryption/decryption (Salsa20/8, fast XOR, key derivation)
//! - [`compression`]: Block (de)compression (LZO, Zlib/deflate)

pub mod compression;
pub mod crypto;
