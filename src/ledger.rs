//! Client side of the IdeaRegistry application on Algorand.
//!
//! `abi` describes the contract methods and encodes their values,
//! `transaction` builds and signs application calls, and `algod` talks to
//! the node's REST API.

pub mod abi;
pub mod algod;
pub mod transaction;

pub use algod::{AlgodClient, AlgodConfig};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Ledger rate limited: {0}")]
    RateLimited(String),
    #[error("Idea hash already registered on chain: {0}")]
    AlreadyRegistered(String),
    #[error("Ledger rejected transaction: {0}")]
    Rejected(String),
    #[error("Ledger transport error: {0}")]
    Transport(String),
    #[error("Ledger decode error: {0}")]
    Decode(String),
    #[error("Ledger configuration error: {0}")]
    Config(String),
    #[error("Transaction {0} not confirmed in time")]
    NotConfirmed(String),
}

impl LedgerError {
    /// Maps a failure message from the node onto the error taxonomy.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        if lowered.contains("429")
            || lowered.contains("rate limit")
            || lowered.contains("too many requests")
        {
            LedgerError::RateLimited(message)
        } else if lowered.contains("already registered") || lowered.contains("already exists") {
            LedgerError::AlreadyRegistered(message)
        } else {
            LedgerError::Rejected(message)
        }
    }
}

/// Outcome of a confirmed `register_idea` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReceipt {
    pub txn_id: String,
    /// Block timestamp returned by the contract, unix seconds
    pub timestamp: u64,
}

/// Data the contract holds for a registered hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainRecord {
    pub founder_address: String,
    pub timestamp: u64,
    pub ipfs_cid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    NotFound,
    /// The read-only query itself failed, so presence is unknown.
    QueryFailed,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    fn app_id(&self) -> u64;

    async fn register(
        &self,
        hash: &[u8; 32],
        cid: &str,
        title_preview: &str,
    ) -> Result<RegistrationReceipt, LedgerError>;

    async fn verification_status(&self, hash: &[u8; 32]) -> VerificationStatus;

    async fn verify(&self, hash: &[u8; 32]) -> bool {
        self.verification_status(hash).await == VerificationStatus::Verified
    }

    async fn get_record(&self, hash: &[u8; 32]) -> Option<OnChainRecord>;

    async fn total_registered(&self) -> u64;

    /// Connectivity probe against the node.
    async fn health(&self) -> Result<(), LedgerError>;
}
