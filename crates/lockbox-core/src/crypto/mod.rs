//! Field-level authenticated encryption.
//!
//! Tokens are `base64(IV || AES-CBC ciphertext || HMAC-SHA256(IV || ciphertext))`.
//! The tag is verified in constant time before any decryption happens.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::models::{LockBox, PayloadField};

type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

/// Symmetric codec for lock box payload fields.
#[derive(Clone)]
pub struct Codec {
    key: Vec<u8>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Codec")
            .field("key", &"[REDACTED]")
            .field("key_bits", &(self.key.len() * 8))
            .finish()
    }
}

impl Codec {
    /// Create a codec from a raw AES key (16, 24 or 32 bytes).
    pub fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 | 24 | 32 => Ok(Self { key: key.to_vec() }),
            other => Err(Error::Cipher(format!(
                "key must be 16, 24 or 32 bytes, got {other}"
            ))),
        }
    }

    /// Create a codec from a base64-encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| Error::Cipher("encryption key is not valid base64".to_string()))?;
        Self::new(&key)
    }

    /// Encrypt one field. Empty input stays empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);
        let ciphertext = self.cbc_encrypt(&iv, plaintext.as_bytes())?;

        let mut token = Vec::with_capacity(IV_LEN + ciphertext.len() + TAG_LEN);
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);
        let tag = self.mac()?.chain_update(&token).finalize().into_bytes();
        token.extend_from_slice(&tag);

        Ok(STANDARD.encode(token))
    }

    /// Decrypt one field. Empty input stays empty.
    pub fn decrypt(&self, token: &str) -> Result<String> {
        if token.is_empty() {
            return Ok(String::new());
        }

        let raw = STANDARD
            .decode(token.trim())
            .map_err(|_| Error::Format("token is not valid base64".to_string()))?;
        if raw.len() < IV_LEN + TAG_LEN {
            return Err(Error::Format("token is too short".to_string()));
        }

        let (signed, tag) = raw.split_at(raw.len() - TAG_LEN);
        self.mac()?
            .chain_update(signed)
            .verify_slice(tag)
            .map_err(|_| Error::Integrity)?;

        let (iv, ciphertext) = signed.split_at(IV_LEN);
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(Error::Format(
                "ciphertext is not a whole number of blocks".to_string(),
            ));
        }

        let plaintext = self.cbc_decrypt(iv, ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| Error::Format("plaintext is not valid UTF-8".to_string()))
    }

    /// Encrypt the four payload fields of a record as a unit.
    pub fn encrypt_fields(&self, record: &LockBox) -> Result<LockBox> {
        self.map_fields(record, |value| self.encrypt(value))
    }

    /// Decrypt the four payload fields of a record as a unit.
    ///
    /// Any failing field fails the whole record.
    pub fn decrypt_fields(&self, record: &LockBox) -> Result<LockBox> {
        self.map_fields(record, |value| self.decrypt(value))
    }

    fn map_fields(
        &self,
        record: &LockBox,
        transform: impl Fn(&str) -> Result<String>,
    ) -> Result<LockBox> {
        let mut output = record.clone();
        for field in PayloadField::ALL {
            let value = field.value(record);
            if value.is_empty() {
                continue;
            }
            *field.value_mut(&mut output) = transform(value)?;
        }
        Ok(output)
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|_| Error::Cipher("invalid HMAC key".to_string()))
    }

    fn cbc_encrypt(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let ciphertext = match self.key.len() {
            16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(&self.key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(&self.key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            _ => cbc::Encryptor::<aes::Aes256>::new_from_slices(&self.key, iv)
                .map_err(invalid_length)?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        Ok(ciphertext)
    }

    fn cbc_decrypt(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let plaintext = match self.key.len() {
            16 => cbc::Decryptor::<aes::Aes128>::new_from_slices(&self.key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            24 => cbc::Decryptor::<aes::Aes192>::new_from_slices(&self.key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
            _ => cbc::Decryptor::<aes::Aes256>::new_from_slices(&self.key, iv)
                .map_err(invalid_length)?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        };
        plaintext.map_err(|_| Error::Format("invalid padding".to_string()))
    }
}

fn invalid_length(_: cbc::cipher::InvalidLength) -> Error {
    Error::Cipher("invalid key or IV length".to_string())
}
