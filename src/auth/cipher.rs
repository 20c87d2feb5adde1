//! Identity handle sealing.
//!
//! Raw user IDs never appear in tokens. They are encrypted with AES-CBC
//! (PKCS#7 padding, IV = first 16 key bytes) and base64-encoded into an
//! opaque handle carried in the `id` claim.

use std::fmt;

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes192CbcEnc = cbc::Encryptor<Aes192>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("cipher key must be 16, 24 or 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("ciphertext is corrupt")]
    Corrupt,

    #[error("identity handle is not valid base64")]
    Encoding,
}

/// Symmetric cipher for identity handles.
pub trait IdentityCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-CBC with a 128, 192 or 256-bit key.
#[derive(Clone)]
pub struct AesCbcCipher {
    key: Vec<u8>,
}

impl fmt::Debug for AesCbcCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesCbcCipher")
            .field("key_bits", &(self.key.len() * 8))
            .finish()
    }
}

impl AesCbcCipher {
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        match key.len() {
            16 | 24 | 32 => Ok(Self { key: key.to_vec() }),
            n => Err(CipherError::KeyLength(n)),
        }
    }

    fn iv(&self) -> &[u8] {
        &self.key[..BLOCK]
    }
}

impl IdentityCipher for AesCbcCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let (key, iv) = (self.key.as_slice(), self.iv());
        let sealed = match key.len() {
            16 => Aes128CbcEnc::new_from_slices(key, iv).map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            24 => Aes192CbcEnc::new_from_slices(key, iv).map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
            _ => Aes256CbcEnc::new_from_slices(key, iv).map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        };
        sealed.map_err(|_| CipherError::KeyLength(key.len()))
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK != 0 {
            return Err(CipherError::Corrupt);
        }
        let (key, iv) = (self.key.as_slice(), self.iv());
        let opened = match key.len() {
            16 => Aes128CbcDec::new_from_slices(key, iv).map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
            24 => Aes192CbcDec::new_from_slices(key, iv).map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
            _ => Aes256CbcDec::new_from_slices(key, iv).map(|c| c.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        };
        opened
            .map_err(|_| CipherError::KeyLength(key.len()))?
            .map_err(|_| CipherError::Corrupt)
    }
}

/// Encrypt a raw user ID into a token-safe handle.
pub fn seal_handle(cipher: &dyn IdentityCipher, raw_id: &str) -> Result<String, CipherError> {
    Ok(STANDARD.encode(cipher.encrypt(raw_id.as_bytes())?))
}

/// Recover the raw user ID from a handle.
pub fn open_handle(cipher: &dyn IdentityCipher, handle: &str) -> Result<String, CipherError> {
    let sealed = STANDARD.decode(handle).map_err(|_| CipherError::Encoding)?;
    let raw = cipher.decrypt(&sealed)?;
    String::from_utf8(raw).map_err(|_| CipherError::Corrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_across_block_boundaries() {
        let keys: [&[u8]; 3] = [
            b"0123456789abcdef",
            b"0123456789abcdef01234567",
            b"0123456789abcdef0123456789abcdef",
        ];
        for key in keys {
            let cipher = AesCbcCipher::new(key).unwrap();
            for len in 0..=48 {
                let plain = vec![b'x'; len];
                let sealed = cipher.encrypt(&plain).unwrap();
                assert_eq!(sealed.len() % BLOCK, 0);
                assert!(sealed.len() > len);
                assert_eq!(cipher.decrypt(&sealed).unwrap(), plain);
            }
        }
    }

    #[test]
    fn test_round_trip_arbitrary_bytes() {
        let cipher = AesCbcCipher::new(b"0123456789abcdef0123456789abcdef").unwrap();
        for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 255] {
            let counting: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let high = vec![0xFFu8; len];
            let mixed: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(151) ^ 0x80).collect();
            for plain in [counting, high, mixed] {
                let sealed = cipher.encrypt(&plain).unwrap();
                assert_eq!(cipher.decrypt(&sealed).unwrap(), plain);
            }
        }
        let utf8 = "ユーザー-42 ✓".as_bytes();
        assert_eq!(cipher.decrypt(&cipher.encrypt(utf8).unwrap()).unwrap(), utf8);
    }

    #[test]
    fn test_rejects_bad_key_length() {
        assert_eq!(AesCbcCipher::new(b"short").unwrap_err(), CipherError::KeyLength(5));
    }

    #[test]
    fn test_rejects_truncated_ciphertext() {
        let cipher = AesCbcCipher::new(b"0123456789abcdef").unwrap();
        let sealed = cipher.encrypt(b"42").unwrap();
        assert_eq!(cipher.decrypt(&sealed[..10]), Err(CipherError::Corrupt));
        assert_eq!(cipher.decrypt(&[]), Err(CipherError::Corrupt));
    }

    #[test]
    fn test_handle_round_trip() {
        let cipher = AesCbcCipher::new(b"0123456789abcdef").unwrap();
        let handle = seal_handle(&cipher, "10086").unwrap();
        assert_ne!(handle, "10086");
        assert_eq!(open_handle(&cipher, &handle).unwrap(), "10086");
        assert_eq!(open_handle(&cipher, "%%%"), Err(CipherError::Encoding));
    }
}
