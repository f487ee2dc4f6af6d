//! Key identifiers and AES key wrap (RFC 3394) for key transfer

use crate::error::{DlmsError, DlmsResult};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use subtle::ConstantTimeEq;

/// Key ID of `global_key_transfer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyId {
    GlobalUnicastEncryptionKey = 0,
    GlobalBroadcastEncryptionKey = 1,
    AuthenticationKey = 2,
}

impl KeyId {
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn from_id(id: u8) -> DlmsResult<Self> {
        match id {
            0 => Ok(KeyId::GlobalUnicastEncryptionKey),
            1 => Ok(KeyId::GlobalBroadcastEncryptionKey),
            2 => Ok(KeyId::AuthenticationKey),
            _ => Err(DlmsError::Security(format!("Invalid key ID: {}", id))),
        }
    }
}

/// Default initial value of RFC 3394
const KEY_WRAP_IV: [u8; 8] = [0xA6; 8];

fn kek_cipher(kek: &[u8]) -> DlmsResult<Aes128> {
    Aes128::new_from_slice(kek)
        .map_err(|_| DlmsError::Security(format!("KEK must be 16 bytes, got {}", kek.len())))
}

/// Wrap `key` under `kek` (RFC 3394, AES-128).
pub fn wrap_aes_rfc3394_key(kek: &[u8], key: &[u8]) -> DlmsResult<Vec<u8>> {
    if key.len() < 16 || key.len() % 8 != 0 {
        return Err(DlmsError::Security(format!(
            "Key to wrap must be a multiple of 8 bytes and at least 16, got {}",
            key.len()
        )));
    }
    let cipher = kek_cipher(kek)?;
    let n = key.len() / 8;
    let mut a = KEY_WRAP_IV;
    let mut r: Vec<[u8; 8]> = key
        .chunks_exact(8)
        .map(|c| {
            let mut block = [0u8; 8];
            block.copy_from_slice(c);
            block
        })
        .collect();

    for j in 0..6u64 {
        for (i, ri) in r.iter_mut().enumerate() {
            let mut block = GenericArray::clone_from_slice(&[a, *ri].concat());
            cipher.encrypt_block(&mut block);
            let t = (n as u64) * j + (i as u64 + 1);
            a.copy_from_slice(&block[..8]);
            for (byte, t_byte) in a.iter_mut().zip(t.to_be_bytes()) {
                *byte ^= t_byte;
            }
            ri.copy_from_slice(&block[8..]);
        }
    }

    let mut out = Vec::with_capacity(8 * (n + 1));
    out.extend_from_slice(&a);
    for ri in &r {
        out.extend_from_slice(ri);
    }
    Ok(out)
}

/// Unwrap a key wrapped under `kek` (RFC 3394, AES-128).
///
/// # Errors
/// `Security` when the integrity check value does not match.
pub fn unwrap_aes_rfc3394_key(kek: &[u8], wrapped_key: &[u8]) -> DlmsResult<Vec<u8>> {
    if wrapped_key.len() < 24 || wrapped_key.len() % 8 != 0 {
        return Err(DlmsError::Security(format!(
            "Wrapped key must be a multiple of 8 bytes and at least 24, got {}",
            wrapped_key.len()
        )));
    }
    let cipher = kek_cipher(kek)?;
    let n = wrapped_key.len() / 8 - 1;
    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped_key[..8]);
    let mut r: Vec<[u8; 8]> = wrapped_key[8..]
        .chunks_exact(8)
        .map(|c| {
            let mut block = [0u8; 8];
            block.copy_from_slice(c);
            block
        })
        .collect();

    for j in (0..6u64).rev() {
        for i in (0..n).rev() {
            let t = (n as u64) * j + (i as u64 + 1);
            let mut a_xor = a;
            for (byte, t_byte) in a_xor.iter_mut().zip(t.to_be_bytes()) {
                *byte ^= t_byte;
            }
            let mut block = GenericArray::clone_from_slice(&[a_xor, r[i]].concat());
            cipher.decrypt_block(&mut block);
            a.copy_from_slice(&block[..8]);
            r[i].copy_from_slice(&block[8..]);
        }
    }

    if !bool::from(a[..].ct_eq(&KEY_WRAP_IV[..])) {
        return Err(DlmsError::Security("Key unwrap integrity check failed".to_string()));
    }
    Ok(r.concat())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3394_vector() {
        // RFC 3394 section 4.1: 128-bit key data with a 128-bit KEK
        let kek = hex::decode("000102030405060708090A0B0C0D0E0F").unwrap();
        let key = hex::decode("00112233445566778899AABBCCDDEEFF").unwrap();
        let wrapped = wrap_aes_rfc3394_key(&kek, &key).unwrap();
        assert_eq!(
            hex::encode_upper(&wrapped),
            "1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5"
        );
        assert_eq!(unwrap_aes_rfc3394_key(&kek, &wrapped).unwrap(), key);
    }

    #[test]
    fn test_unwrap_rejects_tampering() {
        let kek = [7u8; 16];
        let mut wrapped = wrap_aes_rfc3394_key(&kek, &[1u8; 16]).unwrap();
        wrapped[10] ^= 0x01;
        assert!(unwrap_aes_rfc3394_key(&kek, &wrapped).is_err());
        assert!(unwrap_aes_rfc3394_key(&kek, &[0u8; 16]).is_err());
        assert!(unwrap_aes_rfc3394_key(&[0u8; 8], &[0u8; 24]).is_err());
    }

    #[test]
    fn test_key_id() {
        assert_eq!(KeyId::from_id(2).unwrap(), KeyId::AuthenticationKey);
        assert!(KeyId::from_id(3).is_err());
    }
}
