//! Hashing, Algorand addresses and the service-account key

use crate::error::VaultError;
use data_encoding::BASE32_NOPAD;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256, Sha512_256};

/// Raw ed25519 public key carried inside an Algorand address.
pub type PublicKey = [u8; 32];

const CHECKSUM_LEN: usize = 4;
const ADDRESS_LEN: usize = 58;
const MNEMONIC_WORDS: usize = 25;

/// Content hash of an idea: lowercase hex SHA-256 of
/// `title|description|timestamp`.
pub fn idea_hash(title: &str, description: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(description.as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.as_bytes());
    hex::encode(hasher.finalize())
}

/// Decodes a hex idea hash into the 32 raw bytes the ledger keys on.
pub fn hash_bytes_from_hex(hex_str: &str) -> Result<[u8; 32], VaultError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| VaultError::CryptoError(format!("Invalid hex hash: {}", e)))?;
    if bytes.len() != 32 {
        return Err(VaultError::CryptoError(format!(
            "Hash must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    bytes
        .try_into()
        .map_err(|_| VaultError::CryptoError("Failed to convert bytes into hash".to_string()))
}

/// SHA-512/256, the digest Algorand uses for ids, checksums and selectors.
pub fn sha512_256(data: &[u8]) -> [u8; 32] {
    Sha512_256::digest(data).into()
}

/// RFC 4648 base32, uppercase, no padding.
pub fn base32_encode(data: &[u8]) -> String {
    BASE32_NOPAD.encode(data)
}

/// Strict inverse of [`base32_encode`]: non-zero trailing bits are rejected,
/// so every byte string has exactly one accepted spelling.
pub fn base32_decode(encoded: &str) -> Result<Vec<u8>, VaultError> {
    BASE32_NOPAD
        .decode(encoded.as_bytes())
        .map_err(|e| VaultError::CryptoError(format!("Invalid base32: {}", e)))
}

/// Encodes a public key as a 58-character Algorand address.
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let digest = sha512_256(public_key);
    let mut raw = Vec::with_capacity(32 + CHECKSUM_LEN);
    raw.extend_from_slice(public_key);
    raw.extend_from_slice(&digest[32 - CHECKSUM_LEN..]);
    base32_encode(&raw)
}

/// Decodes an Algorand address, validating length and checksum.
pub fn public_key_from_address(address: &str) -> Result<PublicKey, VaultError> {
    if address.len() != ADDRESS_LEN {
        return Err(VaultError::CryptoError(format!(
            "Address must be {} characters, got {}",
            ADDRESS_LEN,
            address.len()
        )));
    }
    let raw = base32_decode(address)?;
    if raw.len() != 32 + CHECKSUM_LEN {
        return Err(VaultError::CryptoError("Malformed address payload".to_string()));
    }

    let (key, checksum) = raw.split_at(32);
    let digest = sha512_256(key);
    if checksum != &digest[32 - CHECKSUM_LEN..] {
        return Err(VaultError::CryptoError("Address checksum mismatch".to_string()));
    }

    key.try_into()
        .map_err(|_| VaultError::CryptoError("Failed to convert bytes into public key".to_string()))
}

pub fn is_valid_address(address: &str) -> bool {
    public_key_from_address(address).is_ok()
}

/// Packs bytes into little-endian 11-bit groups.
fn to_u11(data: &[u8]) -> Vec<u16> {
    let mut out = Vec::with_capacity(data.len() * 8 / 11 + 1);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        buffer |= (byte as u32) << bits;
        bits += 8;
        if bits >= 11 {
            out.push((buffer & 0x7ff) as u16);
            buffer >>= 11;
            bits -= 11;
        }
    }
    if bits > 0 {
        out.push((buffer & 0x7ff) as u16);
    }
    out
}

fn from_u11(words: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 11 / 8 + 1);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &word in words {
        buffer |= (word as u32) << bits;
        bits += 11;
        while bits >= 8 {
            out.push((buffer & 0xff) as u8);
            buffer >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push((buffer & 0xff) as u8);
    }
    out
}

fn checksum_word(seed: &[u8; 32]) -> u16 {
    let digest = sha512_256(seed);
    to_u11(&digest[..2])[0]
}

/// The ed25519 account that signs ledger writes.
#[derive(Clone)]
pub struct Account {
    signing_key: SigningKey,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address())
            .finish()
    }
}

impl Account {
    pub fn generate() -> Self {
        Account {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Account {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Restores an account from its 25-word mnemonic (24 data words plus a
    /// checksum word).
    pub fn from_mnemonic(phrase: &str) -> Result<Self, VaultError> {
        let words: Vec<&str> = phrase.split_whitespace().collect();
        if words.len() != MNEMONIC_WORDS {
            return Err(VaultError::CryptoError(format!(
                "Mnemonic must have {} words, got {}",
                MNEMONIC_WORDS,
                words.len()
            )));
        }

        let word_list = bip39::Language::English.word_list();
        let mut indices = Vec::with_capacity(MNEMONIC_WORDS);
        for word in &words {
            let lowered = word.to_lowercase();
            let index = word_list
                .iter()
                .position(|w| *w == lowered)
                .ok_or_else(|| VaultError::CryptoError(format!("Unknown mnemonic word: {}", word)))?;
            indices.push(index as u16);
        }

        let mut bytes = from_u11(&indices[..MNEMONIC_WORDS - 1]);
        // 24 * 11 bits leaves one trailing zero byte
        if bytes.len() != 33 || bytes[32] != 0 {
            return Err(VaultError::CryptoError("Malformed mnemonic payload".to_string()));
        }
        bytes.truncate(32);

        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| VaultError::CryptoError("Failed to convert mnemonic to seed".to_string()))?;
        if checksum_word(&seed) != indices[MNEMONIC_WORDS - 1] {
            return Err(VaultError::CryptoError("Mnemonic checksum mismatch".to_string()));
        }

        Ok(Self::from_seed(&seed))
    }

    pub fn to_mnemonic(&self) -> String {
        let seed = self.signing_key.to_bytes();
        let word_list = bip39::Language::English.word_list();
        let mut indices = to_u11(&seed);
        indices.push(checksum_word(&seed));
        indices
            .iter()
            .map(|&i| word_list[i as usize])
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn public_key(&self) -> PublicKey {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}
