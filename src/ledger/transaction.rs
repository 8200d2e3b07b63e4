//! Application-call transactions in Algorand's canonical msgpack form.
//!
//! Canonical encoding means map keys in lexical order and zero-valued
//! fields left out, so struct fields below are declared alphabetically by
//! their wire name and every optional field carries `skip_serializing_if`.

use super::LedgerError;
use crate::crypto::{base32_encode, sha512_256, Account, PublicKey};
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Blocks after `first_valid` during which a transaction may be accepted.
pub const VALIDITY_WINDOW: u64 = 1000;

const TXID_DOMAIN: &[u8] = b"TX";

fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// Network parameters needed to build a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestedParams {
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: [u8; 32],
}

impl SuggestedParams {
    /// Same parameters with the fee zeroed, for simulation-only calls.
    pub fn without_fee(&self) -> Self {
        SuggestedParams {
            fee: 0,
            ..self.clone()
        }
    }
}

/// Box the call reads or writes. Index 0 refers to the called application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxReference {
    #[serde(rename = "i", default, skip_serializing_if = "is_zero")]
    pub app_index: u64,
    #[serde(rename = "n", with = "serde_bytes")]
    pub name: Vec<u8>,
}

impl BoxReference {
    pub fn own(name: &[u8]) -> Self {
        BoxReference {
            app_index: 0,
            name: name.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationCallTxn {
    #[serde(rename = "apaa", default, skip_serializing_if = "Vec::is_empty")]
    pub app_args: Vec<ByteBuf>,
    #[serde(rename = "apbx", default, skip_serializing_if = "Vec::is_empty")]
    pub boxes: Vec<BoxReference>,
    #[serde(rename = "apid", default, skip_serializing_if = "is_zero")]
    pub app_id: u64,
    #[serde(rename = "fee", default, skip_serializing_if = "is_zero")]
    pub fee: u64,
    #[serde(rename = "fv", default, skip_serializing_if = "is_zero")]
    pub first_valid: u64,
    #[serde(rename = "gen", default, skip_serializing_if = "String::is_empty")]
    pub genesis_id: String,
    #[serde(rename = "gh", with = "serde_bytes")]
    pub genesis_hash: Vec<u8>,
    #[serde(rename = "lv", default, skip_serializing_if = "is_zero")]
    pub last_valid: u64,
    #[serde(rename = "snd", with = "serde_bytes")]
    pub sender: Vec<u8>,
    #[serde(rename = "type")]
    pub txn_type: String,
}

impl ApplicationCallTxn {
    pub fn new(
        sender: &PublicKey,
        app_id: u64,
        params: &SuggestedParams,
        app_args: Vec<Vec<u8>>,
        boxes: Vec<BoxReference>,
    ) -> Self {
        ApplicationCallTxn {
            app_args: app_args.into_iter().map(ByteBuf::from).collect(),
            boxes,
            app_id,
            fee: params.fee,
            first_valid: params.first_valid,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash.to_vec(),
            last_valid: params.last_valid,
            sender: sender.to_vec(),
            txn_type: "appl".to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| LedgerError::Decode(format!("Failed to encode transaction: {}", e)))
    }

    /// Bytes that are hashed for the id and signed: `"TX" || msgpack(txn)`.
    fn signing_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        let mut bytes = TXID_DOMAIN.to_vec();
        bytes.extend(self.encode()?);
        Ok(bytes)
    }

    pub fn txid(&self) -> Result<String, LedgerError> {
        Ok(base32_encode(&sha512_256(&self.signing_bytes()?)))
    }

    pub fn sign(self, account: &Account) -> Result<SignedTransaction, LedgerError> {
        let signature = account.sign(&self.signing_bytes()?);
        Ok(SignedTransaction {
            sig: signature.to_vec(),
            txn: self,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
    pub txn: ApplicationCallTxn,
}

impl SignedTransaction {
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| LedgerError::Decode(format!("Failed to encode signed transaction: {}", e)))
    }

    pub fn txid(&self) -> Result<String, LedgerError> {
        self.txn.txid()
    }
}

/// Body of `POST /v2/transactions/simulate`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulateRequest {
    #[serde(rename = "txn-groups")]
    pub txn_groups: Vec<SimulateGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulateGroup {
    pub txns: Vec<SignedTransaction>,
}

impl SimulateRequest {
    pub fn single(txn: SignedTransaction) -> Self {
        SimulateRequest {
            txn_groups: vec![SimulateGroup { txns: vec![txn] }],
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| LedgerError::Decode(format!("Failed to encode simulate request: {}", e)))
    }
}
