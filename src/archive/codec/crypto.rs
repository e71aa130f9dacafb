//! Cryptographic operations for MDict file encryption and decryption.
//!
//! This module implements the obfuscation schemes used in MDict files:
//! - Master key derivation from registration codes
//! - Fast XOR-based cipher (key index, v2)
//! - Salsa20/8 stream cipher (record blocks and key block info)

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use ripemd::{Digest, Ripemd128};

use crate::archive::models::EncryptionType;
use crate::types::error::{DictError, Result};

/// Derives the master decryption key from a registration code and user email.
///
/// # Algorithm
/// 1. Hash the user email with RIPEMD-128 → 16-byte digest
/// 2. Use digest as Salsa20/8 key to decrypt the registration code
/// 3. Decrypted registration code becomes the master key
pub fn derive_master_key(reg_code: &[u8], user_id: &[u8]) -> Result<[u8; 16]> {
    debug!("Deriving master key from registration code and user email");

    let salsa_key = ripemd128(&[user_id]);

    let mut master_key_bytes = reg_code.to_vec();
    salsa_decrypt(&mut master_key_bytes, &salsa_key);

    master_key_bytes.try_into().map_err(|_| {
        DictError::DecryptionError("Registration code must be exactly 16 bytes".to_string())
    })
}

/// Inverse of [`derive_master_key`]: the registration code that unlocks
/// `master_key` for `user_id`.
pub fn registration_code(master_key: &[u8; 16], user_id: &[u8]) -> [u8; 16] {
    let mut reg_code = *master_key;
    salsa_decrypt(&mut reg_code, &ripemd128(&[user_id]));
    reg_code
}

/// RIPEMD-128 over the concatenation of `parts`.
pub fn ripemd128(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Ripemd128::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Decrypts data using the fast XOR-based cipher.
///
/// For each byte at position `i`: rotate left by 4 bits, then XOR with
/// `previous_byte ^ i ^ key[i % key.len()]`. The initial `previous_byte` is `0x36`.
pub fn fast_decrypt(data: &mut [u8], key: &[u8]) {
    trace!("Decrypting {} bytes with fast XOR method", data.len());

    let mut prev = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let current = *byte;
        *byte = current.rotate_left(4) ^ prev ^ (i as u8) ^ key[i % key.len()];
        prev = current;
    }
}

/// Inverse of [`fast_decrypt`], used by the writer.
pub fn fast_encrypt(data: &mut [u8], key: &[u8]) {
    let mut prev = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let cipher = (*byte ^ prev ^ (i as u8) ^ key[i % key.len()]).rotate_left(4);
        *byte = cipher;
        prev = cipher;
    }
}

/// Derives the decryption key for v2 key index blocks.
///
/// `Key = RIPEMD-128(checksum_bytes || 0x3695)`, the checksum being bytes 4..8 of the block.
pub fn derive_key_for_v2_index(key_index_block: &[u8]) -> [u8; 16] {
    trace!("Deriving key for v2.x key index using checksum and magic constant");
    ripemd128(&[&key_index_block[4..8], &0x3695u32.to_le_bytes()[..]])
}

/// Decrypts a payload in-place using the specified encryption method.
pub fn decrypt_payload_in_place(payload: &mut [u8], encryption_type: EncryptionType, key: &[u8; 16]) {
    match encryption_type {
        EncryptionType::None => {
            trace!("No encryption, skipping {} bytes", payload.len());
        }
        EncryptionType::Fast => fast_decrypt(payload, key),
        EncryptionType::Salsa20 => salsa_decrypt(payload, key),
    }
}

/// Decrypts data in-place using the Salsa20/8 stream cipher with a 128-bit key.
///
/// The state is the standard 4×4 Salsa20 matrix with the constants
/// "expand 16-byte k", the key repeated in both key slots, a zero nonce and a
/// 64-bit block counter. Only 8 rounds are applied.
pub fn salsa_decrypt(data: &mut [u8], key16: &[u8; 16]) {
    trace!("Decrypting {} bytes with Salsa20/8 (128-bit key)", data.len());

    let mut state = [0u32; 16];
    state[0] = 0x61707865;
    state[5] = 0x3120646e;
    state[10] = 0x79622d36;
    state[15] = 0x6b206574;
    for i in 0..4 {
        state[1 + i] = LittleEndian::read_u32(&key16[i * 4..]);
        state[11 + i] = LittleEndian::read_u32(&key16[i * 4..]);
    }
    let mut keystream_block = [0u8; 64];

    for (block_index, chunk) in data.chunks_mut(64).enumerate() {
        state[8] = block_index as u32;
        state[9] = (block_index as u64 >> 32) as u32;

        let mut x = state;
        for _ in 0..4 {
            // column round
            quarter_round(&mut x, 0, 4, 8, 12);
            quarter_round(&mut x, 5, 9, 13, 1);
            quarter_round(&mut x, 10, 14, 2, 6);
            quarter_round(&mut x, 15, 3, 7, 11);
            // row round
            quarter_round(&mut x, 0, 1, 2, 3);
            quarter_round(&mut x, 5, 6, 7, 4);
            quarter_round(&mut x, 10, 11, 8, 9);
            quarter_round(&mut x, 15, 12, 13, 14);
        }
        for (i, val) in x.iter_mut().enumerate() {
            *val = val.wrapping_add(state[i]);
        }
        for (i, word) in x.iter().enumerate() {
            LittleEndian::write_u32(&mut keystream_block[i * 4..], *word);
        }
        for (byte, key_byte) in chunk.iter_mut().zip(keystream_block.iter()) {
            *byte ^= key_byte;
        }
    }
}

#[inline(always)]
fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}
