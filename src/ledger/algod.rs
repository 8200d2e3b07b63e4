//! HTTP client for an algod node (and, incidentally, its indexer)

use super::abi::{self, AbiMethod};
use super::transaction::{
    ApplicationCallTxn, BoxReference, SimulateRequest, SuggestedParams, VALIDITY_WINDOW,
};
use super::{Ledger, LedgerError, OnChainRecord, RegistrationReceipt, VerificationStatus};
use crate::crypto::{Account, PublicKey};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const TOKEN_HEADER: &str = "X-Algo-API-Token";
const DEFAULT_MIN_FEE: u64 = 1000;
const TOTAL_IDEAS_KEY: &[u8] = b"total_ideas";

#[derive(Debug, Clone)]
pub struct AlgodConfig {
    pub node_url: String,
    pub node_token: Option<String>,
    pub indexer_url: String,
    pub app_id: u64,
    /// 25-word mnemonic of the account that signs registrations
    pub service_mnemonic: Option<String>,
    pub confirmation_rounds: u64,
    pub request_timeout: Duration,
}

impl Default for AlgodConfig {
    fn default() -> Self {
        AlgodConfig {
            node_url: "https://testnet-api.algonode.cloud".to_string(),
            node_token: None,
            indexer_url: "https://testnet-idx.algonode.cloud".to_string(),
            app_id: 0,
            service_mnemonic: None,
            confirmation_rounds: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TransactionParamsResponse {
    #[serde(default)]
    min_fee: u64,
    #[serde(default)]
    genesis_id: String,
    genesis_hash: String,
    last_round: u64,
}

#[derive(Debug, Deserialize)]
struct PostTransactionResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NodeStatusResponse {
    last_round: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PendingTransactionResponse {
    #[serde(default)]
    confirmed_round: Option<u64>,
    #[serde(default)]
    pool_error: String,
    #[serde(default)]
    logs: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SimulateResponse {
    #[serde(default)]
    txn_groups: Vec<SimulateGroupResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SimulateGroupResult {
    #[serde(default)]
    failure_message: Option<String>,
    #[serde(default)]
    txn_results: Vec<SimulateTxnResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SimulateTxnResult {
    txn_result: PendingTransactionResponse,
}

#[derive(Debug, Deserialize)]
struct ApplicationResponse {
    params: ApplicationParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ApplicationParams {
    #[serde(default)]
    global_state: Vec<TealKeyValue>,
}

#[derive(Debug, Deserialize)]
struct TealKeyValue {
    key: String,
    value: TealValue,
}

#[derive(Debug, Deserialize)]
struct TealValue {
    #[serde(default)]
    uint: u64,
}

pub struct AlgodClient {
    config: AlgodConfig,
    client: reqwest::Client,
    service_account: Option<Account>,
}

impl AlgodClient {
    pub fn new(config: AlgodConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let service_account = match config.service_mnemonic.as_deref() {
            Some(phrase) if !phrase.trim().is_empty() => Some(
                Account::from_mnemonic(phrase)
                    .map_err(|e| LedgerError::Config(format!("Invalid service mnemonic: {}", e)))?,
            ),
            _ => None,
        };

        Ok(AlgodClient {
            config,
            client,
            service_account,
        })
    }

    pub fn service_address(&self) -> Option<String> {
        self.service_account.as_ref().map(Account::address)
    }

    fn node_url(&self, path: &str) -> String {
        format!("{}{}", self.config.node_url.trim_end_matches('/'), path)
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.with_token(self.client.get(url))
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        self.with_token(self.client.post(url))
    }

    fn with_token(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.node_token.as_deref() {
            Some(token) if !token.is_empty() => builder.header(TOKEN_HEADER, token),
            _ => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, LedgerError> {
        let response = builder
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(LedgerError::RateLimited(format!("HTTP 429: {}", body)));
            }
            return Err(LedgerError::classify(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))
    }

    pub async fn suggested_params(&self) -> Result<SuggestedParams, LedgerError> {
        let raw: TransactionParamsResponse = self
            .send_json(self.get(self.node_url("/v2/transactions/params")))
            .await?;

        let hash = STANDARD
            .decode(&raw.genesis_hash)
            .map_err(|e| LedgerError::Decode(format!("Invalid genesis hash: {}", e)))?;
        let genesis_hash: [u8; 32] = hash
            .try_into()
            .map_err(|_| LedgerError::Decode("Genesis hash must be 32 bytes".to_string()))?;

        Ok(SuggestedParams {
            fee: if raw.min_fee == 0 { DEFAULT_MIN_FEE } else { raw.min_fee },
            first_valid: raw.last_round,
            last_valid: raw.last_round + VALIDITY_WINDOW,
            genesis_id: raw.genesis_id,
            genesis_hash,
        })
    }

    /// Builds a call against one idea record. The record's box is always
    /// declared, so callers cannot forget it.
    fn record_call(
        &self,
        sender: &PublicKey,
        params: &SuggestedParams,
        method: &AbiMethod,
        hash: &[u8; 32],
        extra_args: Vec<Vec<u8>>,
    ) -> ApplicationCallTxn {
        let mut encoded = vec![abi::encode_hash(hash)];
        encoded.extend(extra_args);
        ApplicationCallTxn::new(
            sender,
            self.config.app_id,
            params,
            abi::method_args(method, encoded),
            vec![BoxReference::own(hash)],
        )
    }

    async fn wait_for_confirmation(
        &self,
        txn_id: &str,
    ) -> Result<PendingTransactionResponse, LedgerError> {
        let status: NodeStatusResponse =
            self.send_json(self.get(self.node_url("/v2/status"))).await?;
        let start_round = status.last_round + 1;
        let mut current_round = start_round;

        while current_round < start_round + self.config.confirmation_rounds {
            let pending: PendingTransactionResponse = self
                .send_json(self.get(self.node_url(&format!("/v2/transactions/pending/{}", txn_id))))
                .await?;

            if pending.confirmed_round.unwrap_or(0) > 0 {
                return Ok(pending);
            }
            if !pending.pool_error.is_empty() {
                return Err(LedgerError::classify(pending.pool_error));
            }

            let _: NodeStatusResponse = self
                .send_json(self.get(self.node_url(&format!(
                    "/v2/status/wait-for-block-after/{}",
                    current_round
                ))))
                .await?;
            current_round += 1;
        }

        Err(LedgerError::NotConfirmed(txn_id.to_string()))
    }

    /// Runs a read-only call in simulation with a fresh throwaway signer
    /// and returns the logs of the simulated transaction.
    async fn simulate(&self, method: &AbiMethod, hash: &[u8; 32]) -> Result<Vec<Vec<u8>>, LedgerError> {
        let params = self.suggested_params().await?.without_fee();
        let throwaway = Account::generate();
        let txn = self.record_call(&throwaway.public_key(), &params, method, hash, Vec::new());
        let body = SimulateRequest::single(txn.sign(&throwaway)?).encode()?;

        let response: SimulateResponse = self
            .send_json(
                self.post(self.node_url("/v2/transactions/simulate?format=json"))
                    .header(reqwest::header::CONTENT_TYPE, "application/msgpack")
                    .body(body),
            )
            .await?;

        let group = response
            .txn_groups
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::Decode("simulate returned no groups".to_string()))?;
        if let Some(message) = group.failure_message.filter(|m| !m.is_empty()) {
            return Err(LedgerError::classify(message));
        }
        let result = group
            .txn_results
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::Decode("simulate returned no results".to_string()))?;

        decode_logs(&result.txn_result.logs)
    }

    /// Full transaction as recorded by the indexer.
    pub async fn transaction_details(&self, txn_id: &str) -> Result<serde_json::Value, LedgerError> {
        let url = format!(
            "{}/v2/transactions/{}",
            self.config.indexer_url.trim_end_matches('/'),
            txn_id
        );
        let mut body: serde_json::Value = self.send_json(self.get(url)).await?;
        if body.get("transaction").is_some() {
            return Ok(body["transaction"].take());
        }
        Ok(body)
    }
}

fn decode_logs(logs: &[String]) -> Result<Vec<Vec<u8>>, LedgerError> {
    logs.iter()
        .map(|line| {
            STANDARD
                .decode(line)
                .map_err(|e| LedgerError::Decode(format!("Invalid log encoding: {}", e)))
        })
        .collect()
}

#[async_trait]
impl Ledger for AlgodClient {
    fn app_id(&self) -> u64 {
        self.config.app_id
    }

    async fn register(
        &self,
        hash: &[u8; 32],
        cid: &str,
        title_preview: &str,
    ) -> Result<RegistrationReceipt, LedgerError> {
        let account = self
            .service_account
            .as_ref()
            .ok_or_else(|| LedgerError::Config("ALGORAND_DEPLOYER_MNEMONIC not set".to_string()))?;

        let params = self.suggested_params().await?;
        let extra = vec![
            abi::encode_string(cid)?,
            abi::encode_string(&abi::title_preview(title_preview))?,
        ];
        let txn = self.record_call(&account.public_key(), &params, &abi::REGISTER_IDEA, hash, extra);
        let signed = txn.sign(account)?;
        let local_id = signed.txid()?;

        let posted: PostTransactionResponse = self
            .send_json(
                self.post(self.node_url("/v2/transactions"))
                    .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
                    .body(signed.encode()?),
            )
            .await?;
        if posted.tx_id != local_id {
            warn!("Node reported txn id {} but computed {}", posted.tx_id, local_id);
        }
        info!(txn_id = %posted.tx_id, app_id = self.config.app_id, "ledger.register.submitted");

        let confirmed = self.wait_for_confirmation(&posted.tx_id).await?;
        let logs = decode_logs(&confirmed.logs)?;
        let payload = abi::find_return(&logs)
            .ok_or_else(|| LedgerError::Decode("register_idea returned no value".to_string()))?;
        let timestamp = abi::decode_uint64(payload)?;

        info!(
            txn_id = %posted.tx_id,
            round = confirmed.confirmed_round.unwrap_or(0),
            timestamp,
            "ledger.register.confirmed"
        );
        Ok(RegistrationReceipt {
            txn_id: posted.tx_id,
            timestamp,
        })
    }

    async fn verification_status(&self, hash: &[u8; 32]) -> VerificationStatus {
        let outcome = self.simulate(&abi::VERIFY_IDEA, hash).await.and_then(|logs| {
            let payload = abi::find_return(&logs)
                .ok_or_else(|| LedgerError::Decode("verify_idea returned no value".to_string()))?;
            abi::decode_bool(payload)
        });

        match outcome {
            Ok(true) => VerificationStatus::Verified,
            Ok(false) => VerificationStatus::NotFound,
            Err(e) => {
                debug!("verify_idea simulation failed: {}", e);
                VerificationStatus::QueryFailed
            }
        }
    }

    async fn get_record(&self, hash: &[u8; 32]) -> Option<OnChainRecord> {
        let outcome = self.simulate(&abi::GET_IDEA, hash).await.and_then(|logs| {
            let payload = abi::find_return(&logs)
                .ok_or_else(|| LedgerError::Decode("get_idea returned no value".to_string()))?;
            abi::decode_idea_tuple(payload)
        });

        match outcome {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("get_idea simulation failed: {}", e);
                None
            }
        }
    }

    async fn total_registered(&self) -> u64 {
        let url = self.node_url(&format!("/v2/applications/{}", self.config.app_id));
        let app: ApplicationResponse = match self.send_json(self.get(url)).await {
            Ok(app) => app,
            Err(e) => {
                debug!("Failed to read application state: {}", e);
                return 0;
            }
        };

        app.params
            .global_state
            .iter()
            .find(|kv| {
                STANDARD
                    .decode(&kv.key)
                    .map(|key| key == TOTAL_IDEAS_KEY)
                    .unwrap_or(false)
            })
            .map(|kv| kv.value.uint)
            .unwrap_or(0)
    }

    async fn health(&self) -> Result<(), LedgerError> {
        self.suggested_params().await.map(|_| ())
    }
}
