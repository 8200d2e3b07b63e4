//! Idea registration: hash, pin, anchor on chain, persist.
//!
//! Steps run in order and any failure aborts the rest. There is no
//! compensation once the ledger write has landed; if persisting fails after
//! that point the transaction id is logged at error level for manual
//! reconciliation.

use crate::content_store::{ContentStore, ContentStoreError};
use crate::crypto;
use crate::error::VaultError;
use crate::ledger::{abi, Ledger, LedgerError};
use crate::models::{Category, IdeaRecord, Stage, Visibility};
use crate::persistence::Persistence;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Raw form fields as submitted by the founder.
#[derive(Debug, Clone, Default)]
pub struct IdeaSubmission {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub stage: Option<String>,
    pub location: Option<String>,
    pub funding_goal: Option<String>,
    pub team_size: Option<String>,
    pub visibility: Option<String>,
}

/// Optional pitch deck uploaded alongside the idea.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
struct ValidatedIdea {
    title: String,
    description: String,
    category: Category,
    stage: Stage,
    location: Option<String>,
    funding_goal: Option<f64>,
    team_size: Option<u32>,
    visibility: Visibility,
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl IdeaSubmission {
    fn validate(&self) -> Result<ValidatedIdea, RegistrationError> {
        let (title, description, category, stage) = match (
            present(&self.title),
            present(&self.description),
            present(&self.category),
            present(&self.stage),
        ) {
            (Some(t), Some(d), Some(c), Some(s)) => (t, d, c, s),
            _ => {
                return Err(RegistrationError::Validation(
                    "title, description, category, stage are required".to_string(),
                ))
            }
        };

        let funding_goal = match present(&self.funding_goal) {
            Some(raw) => {
                let value: f64 = raw.parse().map_err(|_| {
                    RegistrationError::Validation(format!("fundingGoal must be a number: {}", raw))
                })?;
                if !value.is_finite() || value < 0.0 {
                    return Err(RegistrationError::Validation(
                        "fundingGoal must be a non-negative number".to_string(),
                    ));
                }
                Some(value)
            }
            None => None,
        };
        let team_size = match present(&self.team_size) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
                RegistrationError::Validation(format!("teamSize must be a whole number: {}", raw))
            })?),
            None => None,
        };
        let visibility = match present(&self.visibility) {
            Some(raw) => raw.parse::<Visibility>()?,
            None => Visibility::default(),
        };

        Ok(ValidatedIdea {
            title,
            description,
            category: category.parse()?,
            stage: stage.parse()?,
            location: present(&self.location),
            funding_goal,
            team_size,
            visibility,
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    #[error("{0}")]
    Validation(String),
    #[error("An idea with identical content is already registered")]
    Duplicate { existing_txn_id: Option<String> },
    #[error("Idea hash already registered on chain")]
    AlreadyOnChain(String),
    #[error("{0}")]
    RateLimited(String),
    #[error(transparent)]
    ContentStore(ContentStoreError),
    #[error(transparent)]
    Ledger(LedgerError),
    #[error(transparent)]
    Storage(VaultError),
}

impl From<VaultError> for RegistrationError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Validation(msg) => RegistrationError::Validation(msg),
            other => RegistrationError::Storage(other),
        }
    }
}

impl From<ContentStoreError> for RegistrationError {
    fn from(err: ContentStoreError) -> Self {
        match err {
            ContentStoreError::RateLimited { .. } => RegistrationError::RateLimited(err.to_string()),
            other if other.is_rate_limited() => RegistrationError::RateLimited(format!(
                "Too many requests (rate limited) by the content store: {}",
                other
            )),
            other => RegistrationError::ContentStore(other),
        }
    }
}

impl From<LedgerError> for RegistrationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::RateLimited(msg) => RegistrationError::RateLimited(format!(
                "Too many requests (rate limited) by the ledger node: {}",
                msg
            )),
            LedgerError::AlreadyRegistered(msg) => RegistrationError::AlreadyOnChain(msg),
            other => RegistrationError::Ledger(other),
        }
    }
}

/// Source of the registration timestamp.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Block explorer URLs for transactions and the application.
#[derive(Debug, Clone)]
pub struct ExplorerLinks {
    base: String,
}

impl ExplorerLinks {
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        ExplorerLinks {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn tx(&self, txn_id: &str) -> String {
        format!("{}/tx/{}", self.base, txn_id)
    }

    pub fn application(&self, app_id: &str) -> String {
        format!("{}/application/{}", self.base, app_id)
    }
}

/// Everything a caller needs to check the registration independently.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    pub idea_hash: String,
    pub txn_id: String,
    pub app_id: String,
    pub block_timestamp: u64,
    pub ipfs_cid: String,
    pub explorer_link: String,
    pub app_link: String,
    pub ipfs_link: String,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub idea: IdeaRecord,
    pub proof: ProofBundle,
}

pub struct IdeaRegistry {
    persistence: Arc<dyn Persistence>,
    content_store: Arc<dyn ContentStore>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    links: ExplorerLinks,
}

impl IdeaRegistry {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        content_store: Arc<dyn ContentStore>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        links: ExplorerLinks,
    ) -> Self {
        IdeaRegistry {
            persistence,
            content_store,
            ledger,
            clock,
            links,
        }
    }

    pub fn links(&self) -> &ExplorerLinks {
        &self.links
    }

    pub fn proof_for(&self, idea: &IdeaRecord) -> ProofBundle {
        ProofBundle {
            idea_hash: idea.idea_hash.clone(),
            txn_id: idea.txn_id.clone(),
            app_id: idea.app_id.clone(),
            block_timestamp: idea.block_timestamp,
            ipfs_cid: idea.content_cid.clone(),
            explorer_link: self.links.tx(&idea.txn_id),
            app_link: self.links.application(&idea.app_id),
            ipfs_link: self.content_store.gateway_url(&idea.content_cid),
        }
    }

    pub async fn register(
        &self,
        founder_id: &str,
        submission: IdeaSubmission,
        attachment: Option<Attachment>,
    ) -> Result<Registration, RegistrationError> {
        let idea = submission.validate()?;

        let registered_at = self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let idea_hash = crypto::idea_hash(&idea.title, &idea.description, &registered_at);
        let hash_bytes = crypto::hash_bytes_from_hex(&idea_hash)?;

        if let Some(existing) = self.persistence.find_idea_by_hash(&idea_hash)? {
            info!(idea_hash = %idea_hash, "registry.duplicate");
            return Err(RegistrationError::Duplicate {
                existing_txn_id: Some(existing.txn_id),
            });
        }

        let pitch_deck_cid = match attachment {
            Some(file) => Some(
                self.content_store
                    .upload_file(file.bytes, &file.filename)
                    .await?
                    .cid,
            ),
            None => None,
        };

        let metadata = json!({
            "title": idea.title,
            "description": idea.description,
            "category": idea.category,
            "stage": idea.stage,
            "location": idea.location,
            "fundingGoal": idea.funding_goal,
            "teamSize": idea.team_size,
            "founder": founder_id,
            "registeredAt": registered_at,
            "ideaHash": idea_hash,
            "pitchDeckCid": pitch_deck_cid,
        });
        let metadata_name = format!("idea-{}.json", &idea_hash[..8]);
        let content_cid = self.content_store.upload_json(metadata, &metadata_name).await?.cid;

        let receipt = self
            .ledger
            .register(&hash_bytes, &content_cid, &abi::title_preview(&idea.title))
            .await?;
        info!(
            idea_hash = %idea_hash,
            txn_id = %receipt.txn_id,
            block_timestamp = receipt.timestamp,
            "registry.anchored"
        );

        let record = IdeaRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: idea.title,
            description: idea.description,
            category: idea.category,
            stage: idea.stage,
            location: idea.location,
            funding_goal: idea.funding_goal,
            team_size: idea.team_size,
            visibility: idea.visibility,
            idea_hash,
            txn_id: receipt.txn_id,
            app_id: self.ledger.app_id().to_string(),
            block_timestamp: receipt.timestamp,
            content_cid,
            pitch_deck_cid,
            registered_at: registered_at.clone(),
            is_verified: true,
            founder_id: founder_id.to_string(),
            created_at: registered_at,
            founder: None,
        };

        if let Err(e) = self.persistence.insert_idea(&record) {
            return Err(self.persist_failure(&record, e));
        }

        // Re-read for the founder projection; the insert itself succeeded.
        let idea = match self.persistence.find_idea(&record.id) {
            Ok(Some(stored)) => stored,
            Ok(None) => record,
            Err(e) => {
                warn!("Failed to reload idea {}: {}", record.id, e);
                record
            }
        };
        let proof = self.proof_for(&idea);
        info!(idea_id = %idea.id, idea_hash = %idea.idea_hash, "registry.registered");

        Ok(Registration { idea, proof })
    }

    fn persist_failure(&self, record: &IdeaRecord, err: VaultError) -> RegistrationError {
        error!(
            txn_id = %record.txn_id,
            idea_hash = %record.idea_hash,
            "Idea anchored on chain but not persisted: {}",
            err
        );
        match err {
            VaultError::Duplicate(_) => {
                let existing_txn_id = self
                    .persistence
                    .find_idea_by_hash(&record.idea_hash)
                    .ok()
                    .flatten()
                    .map(|existing| existing.txn_id);
                RegistrationError::Duplicate { existing_txn_id }
            }
            other => RegistrationError::Storage(other),
        }
    }
}
