//! ARC-4 method descriptions and value codec for the IdeaRegistry application

use super::{LedgerError, OnChainRecord};
use crate::crypto::{address_from_public_key, sha512_256};

/// Prefix the AVM logs in front of an ABI return value.
pub const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];

/// Maximum characters of the title stored on chain.
pub const TITLE_PREVIEW_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiMethod {
    pub name: &'static str,
    pub args: &'static [&'static str],
    pub returns: &'static str,
}

impl AbiMethod {
    /// Canonical signature, e.g. `verify_idea(byte[32])bool`.
    pub fn signature(&self) -> String {
        format!("{}({}){}", self.name, self.args.join(","), self.returns)
    }

    /// First four bytes of SHA-512/256 over the signature.
    pub fn selector(&self) -> [u8; 4] {
        let digest = sha512_256(self.signature().as_bytes());
        [digest[0], digest[1], digest[2], digest[3]]
    }
}

pub const REGISTER_IDEA: AbiMethod = AbiMethod {
    name: "register_idea",
    args: &["byte[32]", "string", "string"],
    returns: "uint64",
};

pub const VERIFY_IDEA: AbiMethod = AbiMethod {
    name: "verify_idea",
    args: &["byte[32]"],
    returns: "bool",
};

pub const GET_IDEA: AbiMethod = AbiMethod {
    name: "get_idea",
    args: &["byte[32]"],
    returns: "(address,uint64,string)",
};

/// `string`: big-endian u16 byte length followed by UTF-8 bytes.
pub fn encode_string(value: &str) -> Result<Vec<u8>, LedgerError> {
    let len = u16::try_from(value.len())
        .map_err(|_| LedgerError::Decode(format!("string argument too long: {} bytes", value.len())))?;
    let mut out = Vec::with_capacity(2 + value.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(out)
}

/// `byte[32]` is a static array and encodes as the raw bytes.
pub fn encode_hash(hash: &[u8; 32]) -> Vec<u8> {
    hash.to_vec()
}

/// Truncates a title to the on-chain preview length, on a char boundary.
pub fn title_preview(title: &str) -> String {
    title.chars().take(TITLE_PREVIEW_CHARS).collect()
}

/// Application args for a method call: selector then encoded arguments.
pub fn method_args(method: &AbiMethod, encoded: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut args = Vec::with_capacity(encoded.len() + 1);
    args.push(method.selector().to_vec());
    args.extend(encoded);
    args
}

/// Finds the ABI return payload: the last log line carrying the prefix.
pub fn find_return(logs: &[Vec<u8>]) -> Option<&[u8]> {
    logs.iter()
        .rev()
        .find(|line| line.starts_with(&RETURN_PREFIX))
        .map(|line| &line[RETURN_PREFIX.len()..])
}

pub fn decode_uint64(payload: &[u8]) -> Result<u64, LedgerError> {
    let bytes: [u8; 8] = payload
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| LedgerError::Decode(format!("uint64 needs 8 bytes, got {}", payload.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

pub fn decode_bool(payload: &[u8]) -> Result<bool, LedgerError> {
    payload
        .first()
        .map(|b| b & 0x80 != 0)
        .ok_or_else(|| LedgerError::Decode("bool needs 1 byte".to_string()))
}

/// Decodes `(address,uint64,string)`: a 42-byte head (32 + 8 + u16 offset)
/// followed by the length-prefixed string in the tail.
pub fn decode_idea_tuple(payload: &[u8]) -> Result<OnChainRecord, LedgerError> {
    const HEAD_LEN: usize = 32 + 8 + 2;
    if payload.len() < HEAD_LEN {
        return Err(LedgerError::Decode(format!(
            "tuple head needs {} bytes, got {}",
            HEAD_LEN,
            payload.len()
        )));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&payload[..32]);
    let timestamp = decode_uint64(&payload[32..40])?;
    let offset = u16::from_be_bytes([payload[40], payload[41]]) as usize;

    let len_bytes = payload
        .get(offset..offset + 2)
        .ok_or_else(|| LedgerError::Decode("string offset out of range".to_string()))?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    let cid_bytes = payload
        .get(offset + 2..offset + 2 + len)
        .ok_or_else(|| LedgerError::Decode("string body out of range".to_string()))?;
    let ipfs_cid = String::from_utf8(cid_bytes.to_vec())
        .map_err(|e| LedgerError::Decode(format!("string is not UTF-8: {}", e)))?;

    Ok(OnChainRecord {
        founder_address: address_from_public_key(&key),
        timestamp,
        ipfs_cid,
    })
}
