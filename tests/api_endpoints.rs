//! Integration tests for the IdeaVault API
//!
//! The router runs against an in-memory database with scripted ledger and
//! content-store fakes, so every flow is deterministic.

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderValue};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestRequest, TestServer};
use chrono::{TimeZone, Utc};
use ideavault::api::{build_api_router, AppState};
use ideavault::auth::JwtKeys;
use ideavault::content_store::{ContentStore, ContentStoreError, UploadResult};
use ideavault::ledger::{Ledger, LedgerError, OnChainRecord, RegistrationReceipt, VerificationStatus};
use ideavault::error::VaultError;
use ideavault::models::{IdeaRecord, Message, NewUser, ShortlistEntry, User};
use ideavault::persistence::{Database, IdeaFilter, Persistence};
use ideavault::registry::{ExplorerLinks, FixedClock, IdeaRegistry};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const REGISTERED_AT: &str = "2026-01-01T00:00:00.000Z";
const EXPLORER: &str = "https://testnet.algoexplorer.io";

#[derive(Default)]
struct FakeLedger {
    registered: Mutex<HashSet<[u8; 32]>>,
    counter: AtomicU64,
    rate_limited: AtomicBool,
    rejects: AtomicBool,
    queries_fail: AtomicBool,
}

#[async_trait]
impl Ledger for FakeLedger {
    fn app_id(&self) -> u64 {
        4242
    }

    async fn register(
        &self,
        hash: &[u8; 32],
        _cid: &str,
        _title_preview: &str,
    ) -> Result<RegistrationReceipt, LedgerError> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(LedgerError::RateLimited("HTTP 429".to_string()));
        }
        if self.rejects.load(Ordering::SeqCst) {
            return Err(LedgerError::Rejected("overspend".to_string()));
        }
        if !self.registered.lock().unwrap().insert(*hash) {
            return Err(LedgerError::AlreadyRegistered("already registered".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RegistrationReceipt {
            txn_id: format!("TXN{:04}", n),
            timestamp: 1_767_225_600 + n,
        })
    }

    async fn verification_status(&self, hash: &[u8; 32]) -> VerificationStatus {
        if self.queries_fail.load(Ordering::SeqCst) {
            VerificationStatus::QueryFailed
        } else if self.registered.lock().unwrap().contains(hash) {
            VerificationStatus::Verified
        } else {
            VerificationStatus::NotFound
        }
    }

    async fn get_record(&self, hash: &[u8; 32]) -> Option<OnChainRecord> {
        self.registered
            .lock()
            .unwrap()
            .contains(hash)
            .then(|| OnChainRecord {
                founder_address: "SERVICE".to_string(),
                timestamp: 1_767_225_601,
                ipfs_cid: "QmMeta".to_string(),
            })
    }

    async fn total_registered(&self) -> u64 {
        self.registered.lock().unwrap().len() as u64
    }

    async fn health(&self) -> Result<(), LedgerError> {
        if self.queries_fail.load(Ordering::SeqCst) {
            Err(LedgerError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct FakeContentStore {
    counter: AtomicU64,
    rate_limited: AtomicBool,
    /// Body of a non-429 rejection returned by every upload
    rejection: Mutex<Option<String>>,
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn upload_json(&self, _value: Value, name: &str) -> Result<UploadResult, ContentStoreError> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(ContentStoreError::RateLimited { attempts: 4 });
        }
        if let Some(body) = self.rejection.lock().unwrap().clone() {
            return Err(ContentStoreError::Upload { status: 403, body });
        }
        self.uploads.lock().unwrap().push(name.to_string());
        let cid = format!("QmJson{}", self.counter.fetch_add(1, Ordering::SeqCst));
        Ok(UploadResult {
            url: self.gateway_url(&cid),
            cid,
        })
    }

    async fn upload_file(&self, _bytes: Vec<u8>, filename: &str) -> Result<UploadResult, ContentStoreError> {
        self.uploads.lock().unwrap().push(filename.to_string());
        let cid = format!("QmFile{}", self.counter.fetch_add(1, Ordering::SeqCst));
        Ok(UploadResult {
            url: self.gateway_url(&cid),
            cid,
        })
    }

    fn gateway_url(&self, cid: &str) -> String {
        format!("https://gateway.test/ipfs/{}", cid)
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Database whose first `n` hash lookups miss, as if another request
/// inserted the same hash between the pre-check and the insert.
struct RacingPersistence {
    inner: Database,
    hidden_lookups: AtomicUsize,
}

impl Persistence for RacingPersistence {
    fn create_user(&self, user: NewUser) -> Result<User, VaultError> {
        self.inner.create_user(user)
    }
    fn find_user_by_id(&self, id: &str) -> Result<Option<User>, VaultError> {
        self.inner.find_user_by_id(id)
    }
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, VaultError> {
        self.inner.find_user_by_email(email)
    }
    fn update_wallet(&self, user_id: &str, wallet_address: &str) -> Result<(), VaultError> {
        self.inner.update_wallet(user_id, wallet_address)
    }
    fn insert_idea(&self, idea: &IdeaRecord) -> Result<(), VaultError> {
        self.inner.insert_idea(idea)
    }
    fn find_idea(&self, id: &str) -> Result<Option<IdeaRecord>, VaultError> {
        self.inner.find_idea(id)
    }
    fn find_idea_by_hash(&self, idea_hash: &str) -> Result<Option<IdeaRecord>, VaultError> {
        let hide = self
            .hidden_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hide {
            return Ok(None);
        }
        self.inner.find_idea_by_hash(idea_hash)
    }
    fn list_ideas(&self, filter: &IdeaFilter, offset: u64, limit: u64) -> Result<Vec<IdeaRecord>, VaultError> {
        self.inner.list_ideas(filter, offset, limit)
    }
    fn count_ideas(&self, filter: &IdeaFilter) -> Result<u64, VaultError> {
        self.inner.count_ideas(filter)
    }
    fn count_all_ideas(&self, verified_only: bool) -> Result<u64, VaultError> {
        self.inner.count_all_ideas(verified_only)
    }
    fn set_idea_verified(&self, id: &str, verified: bool) -> Result<(), VaultError> {
        self.inner.set_idea_verified(id, verified)
    }
    fn upsert_shortlist(&self, investor_id: &str, idea_id: &str, note: Option<&str>) -> Result<ShortlistEntry, VaultError> {
        self.inner.upsert_shortlist(investor_id, idea_id, note)
    }
    fn list_shortlist(&self, investor_id: &str) -> Result<Vec<ShortlistEntry>, VaultError> {
        self.inner.list_shortlist(investor_id)
    }
    fn insert_message(&self, message: &Message) -> Result<(), VaultError> {
        self.inner.insert_message(message)
    }
    fn conversation(&self, idea_id: &str, user_id: &str) -> Result<Vec<Message>, VaultError> {
        self.inner.conversation(idea_id, user_id)
    }
    fn inbox(&self, user_id: &str) -> Result<Vec<Message>, VaultError> {
        self.inner.inbox(user_id)
    }
}

struct Harness {
    server: TestServer,
    ledger: Arc<FakeLedger>,
    content_store: Arc<FakeContentStore>,
}

fn harness() -> Harness {
    harness_with(Arc::new(Database::open_in_memory().unwrap()))
}

fn harness_with(persistence: Arc<dyn Persistence>) -> Harness {
    let ledger = Arc::new(FakeLedger::default());
    let content_store = Arc::new(FakeContentStore::default());
    let clock = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

    let registry = IdeaRegistry::new(
        persistence.clone(),
        content_store.clone(),
        ledger.clone(),
        Arc::new(FixedClock(clock)),
        ExplorerLinks::new(EXPLORER),
    );
    let state = AppState::new(
        persistence,
        content_store.clone(),
        ledger.clone(),
        registry,
        JwtKeys::new_dev(),
    );

    let server = TestServer::new(build_api_router(Arc::new(state))).unwrap();
    Harness {
        server,
        ledger,
        content_store,
    }
}

fn bearer(request: TestRequest, token: &str) -> TestRequest {
    request.add_header(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    )
}

/// Registers a user and returns `(user_id, token)`.
async fn sign_up(server: &TestServer, email: &str, role: &str) -> (String, String) {
    let response = server
        .post("/api/auth/register")
        .json(&json!({
            "name": format!("User {}", email),
            "email": email,
            "password": "hunter22-long-enough",
            "role": role,
            "company": "Acme",
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    (
        body["user"]["id"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

fn idea_form(title: &str, description: &str, visibility: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("title", title)
        .add_text("description", description)
        .add_text("category", "FINTECH")
        .add_text("stage", "MVP")
        .add_text("location", "Berlin")
        .add_text("fundingGoal", "250000")
        .add_text("teamSize", "3")
        .add_text("visibility", visibility)
}

async fn submit_idea(server: &TestServer, token: &str, form: MultipartForm) -> axum_test::TestResponse {
    bearer(server.post("/api/ideas"), token).multipart(form).await
}

#[tokio::test]
async fn test_register_idea_end_to_end() {
    let h = harness();
    let (founder_id, token) = sign_up(&h.server, "founder@example.com", "FOUNDER").await;

    let response = submit_idea(&h.server, &token, idea_form("X", "Y", "PUBLIC")).await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();

    let expected_hash = hex::encode(Sha256::digest(format!("X|Y|{}", REGISTERED_AT).as_bytes()));
    assert_eq!(body["success"], true);
    assert_eq!(body["idea"]["ideaHash"], expected_hash.as_str());
    assert_eq!(body["idea"]["registeredAt"], REGISTERED_AT);
    assert_eq!(body["idea"]["isVerified"], true);
    assert_eq!(body["idea"]["founder"]["id"], founder_id.as_str());

    let proof = &body["blockchainProof"];
    let txn_id = proof["txnId"].as_str().unwrap();
    assert_eq!(txn_id, "TXN0001");
    assert!(proof["explorerLink"].as_str().unwrap().contains(txn_id));
    assert_eq!(proof["appId"], "4242");
    assert_eq!(proof["appLink"], format!("{}/application/4242", EXPLORER).as_str());
    assert_eq!(proof["ipfsLink"], "https://gateway.test/ipfs/QmJson0");

    let idea_id = body["idea"]["id"].as_str().unwrap();
    let detail = bearer(h.server.get(&format!("/api/ideas/{}", idea_id)), &token).await;
    assert_eq!(detail.status_code(), 200);
    let detail: Value = detail.json();
    assert_eq!(detail["idea"]["ideaHash"], expected_hash.as_str());
    assert_eq!(detail["idea"]["fundingGoal"], 250000.0);

    let uploads = h.content_store.uploads.lock().unwrap().clone();
    assert_eq!(uploads, vec![format!("idea-{}.json", &expected_hash[..8])]);
}

#[tokio::test]
async fn test_pitch_deck_is_pinned_before_metadata() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "deck@example.com", "FOUNDER").await;

    let form = idea_form("Deck", "With attachment", "PUBLIC").add_part(
        "pitchDeck",
        Part::bytes(b"%PDF-1.4 fake".to_vec())
            .file_name("deck.pdf")
            .mime_type("application/pdf"),
    );
    let response = submit_idea(&h.server, &token, form).await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["idea"]["pitchDeckCid"], "QmFile0");
    assert_eq!(body["idea"]["ipfsCid"], "QmJson1");

    let uploads = h.content_store.uploads.lock().unwrap().clone();
    assert_eq!(uploads[0], "deck.pdf");
}

#[tokio::test]
async fn test_duplicate_submission_returns_first_txn() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "dup@example.com", "FOUNDER").await;

    let first = submit_idea(&h.server, &token, idea_form("Same", "Content", "PUBLIC")).await;
    assert_eq!(first.status_code(), 201);
    let first: Value = first.json();

    let second = submit_idea(&h.server, &token, idea_form("Same", "Content", "PUBLIC")).await;
    assert_eq!(second.status_code(), 409);
    let second: Value = second.json();
    assert_eq!(second["existingTxnId"], first["blockchainProof"]["txnId"]);
    assert!(second["error"].is_string());
}

#[tokio::test]
async fn test_validation_and_role_checks_on_submit() {
    let h = harness();
    let (_, founder) = sign_up(&h.server, "v@example.com", "FOUNDER").await;
    let (_, investor) = sign_up(&h.server, "inv@example.com", "INVESTOR").await;

    let missing_title = MultipartForm::new()
        .add_text("description", "No title")
        .add_text("category", "FINTECH")
        .add_text("stage", "MVP");
    assert_eq!(submit_idea(&h.server, &founder, missing_title).await.status_code(), 400);

    let bad_category = idea_form("T", "D", "PUBLIC").add_text("category", "ROBOTICS");
    assert_eq!(submit_idea(&h.server, &founder, bad_category).await.status_code(), 400);

    let response = submit_idea(&h.server, &investor, idea_form("T", "D", "PUBLIC")).await;
    assert_eq!(response.status_code(), 403);

    let response = h.server.post("/api/ideas").multipart(idea_form("T", "D", "PUBLIC")).await;
    assert_eq!(response.status_code(), 401);

    assert_eq!(h.ledger.total_registered().await, 0);
}

#[tokio::test]
async fn test_upstream_rate_limit_maps_to_429() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "rl@example.com", "FOUNDER").await;

    h.content_store.rate_limited.store(true, Ordering::SeqCst);
    let response = submit_idea(&h.server, &token, idea_form("A", "B", "PUBLIC")).await;
    assert_eq!(response.status_code(), 429);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("Too many requests"));
    assert_eq!(h.ledger.total_registered().await, 0);

    h.content_store.rate_limited.store(false, Ordering::SeqCst);
    h.ledger.rate_limited.store(true, Ordering::SeqCst);
    let response = submit_idea(&h.server, &token, idea_form("A", "B", "PUBLIC")).await;
    assert_eq!(response.status_code(), 429);
}

#[tokio::test]
async fn test_rate_limit_message_from_content_store_maps_to_429() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "rl-body@example.com", "FOUNDER").await;

    *h.content_store.rejection.lock().unwrap() = Some("Rate limit exceeded".to_string());
    let response = submit_idea(&h.server, &token, idea_form("A", "B", "PUBLIC")).await;
    assert_eq!(response.status_code(), 429);
    assert_eq!(h.ledger.total_registered().await, 0);

    *h.content_store.rejection.lock().unwrap() = Some("invalid key".to_string());
    let response = submit_idea(&h.server, &token, idea_form("A", "B", "PUBLIC")).await;
    assert_eq!(response.status_code(), 500);
}

#[tokio::test]
async fn test_ledger_failure_persists_nothing() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "rejected@example.com", "FOUNDER").await;

    h.ledger.rejects.store(true, Ordering::SeqCst);
    let response = submit_idea(&h.server, &token, idea_form("Lost", "Never stored", "PUBLIC")).await;
    assert_eq!(response.status_code(), 500);
    let body: Value = response.json();
    assert!(!body["error"].as_str().unwrap().contains("overspend"));

    let listed: Value = bearer(h.server.get("/api/ideas"), &token).await.json();
    assert_eq!(listed["total"], 0);
    let stats: Value = h.server.get("/api/ideas/stats").await.json();
    assert_eq!(stats["totalIdeas"], 0);
}

#[tokio::test]
async fn test_hash_already_on_chain_is_conflict() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "chain@example.com", "FOUNDER").await;

    let digest: [u8; 32] = Sha256::digest(format!("T|D|{}", REGISTERED_AT).as_bytes()).into();
    h.ledger.registered.lock().unwrap().insert(digest);

    let response = submit_idea(&h.server, &token, idea_form("T", "D", "PUBLIC")).await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert!(body["existingTxnId"].is_null());

    let listed: Value = bearer(h.server.get("/api/ideas"), &token).await.json();
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn test_unique_index_race_reports_winning_txn() {
    let persistence = Arc::new(RacingPersistence {
        inner: Database::open_in_memory().unwrap(),
        hidden_lookups: AtomicUsize::new(0),
    });
    let h = harness_with(persistence.clone());
    let (founder_id, token) = sign_up(&h.server, "race@example.com", "FOUNDER").await;

    // The winning request stored this hash without going through our ledger.
    let winner: Value = submit_idea(&h.server, &token, idea_form("Race", "Condition", "PUBLIC"))
        .await
        .json();
    let winning_txn = winner["blockchainProof"]["txnId"].as_str().unwrap().to_string();
    h.ledger.registered.lock().unwrap().clear();

    persistence.hidden_lookups.store(1, Ordering::SeqCst);
    let response = submit_idea(&h.server, &token, idea_form("Race", "Condition", "PUBLIC")).await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["existingTxnId"], winning_txn.as_str());

    // The loser reached the ledger but left no row behind.
    assert_eq!(h.ledger.counter.load(Ordering::SeqCst), 2);
    let own = IdeaFilter {
        founder_id: Some(founder_id),
        ..IdeaFilter::default()
    };
    assert_eq!(persistence.count_ideas(&own).unwrap(), 1);
}

#[tokio::test]
async fn test_listing_is_scoped_by_role() {
    let h = harness();
    let (_, alice) = sign_up(&h.server, "alice@example.com", "FOUNDER").await;
    let (_, bob) = sign_up(&h.server, "bob@example.com", "FOUNDER").await;
    let (_, investor) = sign_up(&h.server, "vc@example.com", "INVESTOR").await;

    submit_idea(&h.server, &alice, idea_form("Alice public", "a1", "PUBLIC")).await;
    submit_idea(&h.server, &alice, idea_form("Alice private", "a2", "PRIVATE")).await;
    submit_idea(&h.server, &bob, idea_form("Bob nda", "b1", "NDA_REQUIRED")).await;

    let alice_list: Value = bearer(h.server.get("/api/ideas"), &alice).await.json();
    assert_eq!(alice_list["total"], 2);
    let titles: Vec<&str> = alice_list["ideas"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["title"].as_str().unwrap())
        .collect();
    assert!(titles.iter().all(|t| t.starts_with("Alice")));

    let investor_list: Value = bearer(h.server.get("/api/ideas"), &investor).await.json();
    assert_eq!(investor_list["total"], 1);
    assert_eq!(investor_list["ideas"][0]["title"], "Alice public");
    assert_eq!(investor_list["ideas"][0]["founder"]["name"], "User alice@example.com");

    let searched: Value = bearer(h.server.get("/api/ideas?search=PRIVATE&limit=5"), &alice)
        .await
        .json();
    assert_eq!(searched["total"], 1);

    let bad = bearer(h.server.get("/api/ideas?stage=SOMEDAY"), &alice).await;
    assert_eq!(bad.status_code(), 400);
}

#[tokio::test]
async fn test_private_idea_access() {
    let h = harness();
    let (_, owner) = sign_up(&h.server, "owner@example.com", "FOUNDER").await;
    let (_, other) = sign_up(&h.server, "other@example.com", "FOUNDER").await;
    let (_, investor) = sign_up(&h.server, "i@example.com", "INVESTOR").await;

    let created: Value = submit_idea(&h.server, &owner, idea_form("Secret", "Sauce", "PRIVATE"))
        .await
        .json();
    let path = format!("/api/ideas/{}", created["idea"]["id"].as_str().unwrap());

    assert_eq!(bearer(h.server.get(&path), &owner).await.status_code(), 200);
    assert_eq!(bearer(h.server.get(&path), &other).await.status_code(), 403);
    assert_eq!(bearer(h.server.get(&path), &investor).await.status_code(), 403);
    assert_eq!(
        bearer(h.server.get("/api/ideas/does-not-exist"), &owner)
            .await
            .status_code(),
        404
    );
}

#[tokio::test]
async fn test_reverify_reports_live_status() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "verify@example.com", "FOUNDER").await;
    let created: Value = submit_idea(&h.server, &token, idea_form("V", "W", "PUBLIC"))
        .await
        .json();
    let path = format!("/api/ideas/{}/verify", created["idea"]["id"].as_str().unwrap());

    let report: Value = bearer(h.server.post(&path), &token).await.json();
    assert_eq!(report["verified"], true);
    assert_eq!(report["status"], "VERIFIED");
    assert_eq!(report["onChainData"]["ipfsCid"], "QmMeta");
    assert!(report["explorerLink"].as_str().unwrap().ends_with("/tx/TXN0001"));

    h.ledger.queries_fail.store(true, Ordering::SeqCst);
    let report: Value = bearer(h.server.post(&path), &token).await.json();
    assert_eq!(report["verified"], false);
    assert_eq!(report["status"], "QUERY_FAILED");
    assert!(report["onChainData"].is_null());

    // A failed query leaves the stored flag alone.
    let detail: Value = bearer(
        h.server.get(&format!("/api/ideas/{}", created["idea"]["id"].as_str().unwrap())),
        &token,
    )
    .await
    .json();
    assert_eq!(detail["idea"]["isVerified"], true);
}

#[tokio::test]
async fn test_platform_stats() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "stats@example.com", "FOUNDER").await;
    submit_idea(&h.server, &token, idea_form("S1", "one", "PUBLIC")).await;
    submit_idea(&h.server, &token, idea_form("S2", "two", "PRIVATE")).await;

    let stats: Value = h.server.get("/api/ideas/stats").await.json();
    assert_eq!(stats["totalIdeas"], 2);
    assert_eq!(stats["verifiedIdeas"], 2);
    assert_eq!(stats["onChainTotal"], 2);
}

#[tokio::test]
async fn test_shortlist_upserts_note() {
    let h = harness();
    let (_, founder) = sign_up(&h.server, "sf@example.com", "FOUNDER").await;
    let (_, investor) = sign_up(&h.server, "si@example.com", "INVESTOR").await;
    let created: Value = submit_idea(&h.server, &founder, idea_form("Shortlisted", "idea", "PUBLIC"))
        .await
        .json();
    let path = format!("/api/ideas/{}/shortlist", created["idea"]["id"].as_str().unwrap());

    let first = bearer(h.server.post(&path), &investor)
        .json(&json!({ "note": "call next week" }))
        .await;
    assert_eq!(first.status_code(), 200);
    let second: Value = bearer(h.server.post(&path), &investor)
        .json(&json!({ "note": "term sheet" }))
        .await
        .json();
    assert_eq!(second["shortlist"]["note"], "term sheet");

    let list: Value = bearer(h.server.get("/api/shortlist"), &investor).await.json();
    let entries = list["shortlist"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["note"], "term sheet");
    assert_eq!(entries[0]["ideaTitle"], "Shortlisted");

    assert_eq!(
        bearer(h.server.post("/api/ideas/missing/shortlist"), &investor)
            .json(&json!({}))
            .await
            .status_code(),
        404
    );
    assert_eq!(
        bearer(h.server.post(&path), &founder).json(&json!({})).await.status_code(),
        403
    );
}

#[tokio::test]
async fn test_auth_flow() {
    let h = harness();
    let (user_id, _) = sign_up(&h.server, "auth@example.com", "INVESTOR").await;

    let dup = h
        .server
        .post("/api/auth/register")
        .json(&json!({
            "name": "Again",
            "email": "AUTH@example.com",
            "password": "whatever-password",
            "role": "INVESTOR",
        }))
        .await;
    assert_eq!(dup.status_code(), 409);

    let bad_role = h
        .server
        .post("/api/auth/register")
        .json(&json!({ "name": "N", "email": "n@example.com", "password": "p", "role": "ADMIN" }))
        .await;
    assert_eq!(bad_role.status_code(), 400);

    let wrong = h
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "auth@example.com", "password": "nope" }))
        .await;
    assert_eq!(wrong.status_code(), 401);

    let login = h
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "auth@example.com", "password": "hunter22-long-enough" }))
        .await;
    assert_eq!(login.status_code(), 200);
    let login: Value = login.json();
    assert!(login["user"].get("passwordHash").is_none());
    let token = login["token"].as_str().unwrap();

    let me: Value = bearer(h.server.get("/api/auth/me"), token).await.json();
    assert_eq!(me["user"]["id"], user_id.as_str());
    assert_eq!(me["user"]["role"], "INVESTOR");

    assert_eq!(h.server.get("/api/auth/me").await.status_code(), 401);
    assert_eq!(
        bearer(h.server.get("/api/auth/me"), "not-a-jwt").await.status_code(),
        401
    );
}

#[tokio::test]
async fn test_wallet_update_validates_address() {
    let h = harness();
    let (_, token) = sign_up(&h.server, "wallet@example.com", "FOUNDER").await;
    let address = ideavault::crypto::Account::generate().address();

    let bad = bearer(h.server.patch("/api/auth/wallet"), &token)
        .json(&json!({ "walletAddress": "NOT-AN-ADDRESS" }))
        .await;
    assert_eq!(bad.status_code(), 400);

    // Same payload bits as the zero-key address, but a non-zero padding bit.
    let zero = ideavault::crypto::address_from_public_key(&[0u8; 32]);
    let alias = format!("{}R", &zero[..zero.len() - 1]);
    let aliased = bearer(h.server.patch("/api/auth/wallet"), &token)
        .json(&json!({ "walletAddress": alias }))
        .await;
    assert_eq!(aliased.status_code(), 400);

    let ok = bearer(h.server.patch("/api/auth/wallet"), &token)
        .json(&json!({ "walletAddress": address }))
        .await;
    assert_eq!(ok.status_code(), 200);
    let me: Value = bearer(h.server.get("/api/auth/me"), &token).await.json();
    assert_eq!(me["user"]["walletAddress"], address.as_str());
}

#[tokio::test]
async fn test_messaging_conversation_and_inbox() {
    let h = harness();
    let (founder_id, founder) = sign_up(&h.server, "mf@example.com", "FOUNDER").await;
    let (investor_id, investor) = sign_up(&h.server, "mi@example.com", "INVESTOR").await;
    let created: Value = submit_idea(&h.server, &founder, idea_form("Chat", "about this", "PUBLIC"))
        .await
        .json();
    let idea_id = created["idea"]["id"].as_str().unwrap().to_string();

    let missing = bearer(h.server.post("/api/messages"), &investor)
        .json(&json!({ "receiverId": founder_id, "ideaId": idea_id }))
        .await;
    assert_eq!(missing.status_code(), 400);

    let sent = bearer(h.server.post("/api/messages"), &investor)
        .json(&json!({ "receiverId": founder_id, "ideaId": idea_id, "content": "Interested!" }))
        .await;
    assert_eq!(sent.status_code(), 201);
    let sent: Value = sent.json();
    assert_eq!(sent["message"]["sender"]["role"], "INVESTOR");

    bearer(h.server.post("/api/messages"), &founder)
        .json(&json!({ "receiverId": investor_id, "ideaId": idea_id, "content": "Let's talk" }))
        .await;

    let conversation: Value = bearer(h.server.get(&format!("/api/messages/{}", idea_id)), &founder)
        .await
        .json();
    let messages = conversation["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "Interested!");

    let inbox: Value = bearer(h.server.get("/api/messages"), &investor).await.json();
    let inbox = inbox["messages"].as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["ideaTitle"], "Chat");
}

#[tokio::test]
async fn test_health_endpoints() {
    let h = harness();

    let response = h.server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["algorandNetwork"], "testnet");
    assert_eq!(json["appId"], "4242");
    assert!(json["timestamp"].is_string());

    let response = h.server.get("/api/health/check").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");

    h.ledger.queries_fail.store(true, Ordering::SeqCst);
    let response = h.server.get("/api/health/check").await;
    assert_eq!(response.status_code(), 503);
    let json: Value = response.json();
    assert_eq!(json["services"]["algorand"]["status"], "unhealthy");
}
