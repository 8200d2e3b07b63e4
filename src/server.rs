//! Startup wiring: configuration in, running API server out.

use crate::api::{self, AppState};
use crate::auth::JwtKeys;
use crate::config::Config;
use crate::content_store::{ContentStore, PinataClient};
use crate::ledger::{AlgodClient, Ledger};
use crate::persistence::{Database, Persistence};
use crate::registry::{ExplorerLinks, IdeaRegistry, SystemClock};
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Server {
    pub config: Config,
    pub state: Arc<AppState>,
}

impl Server {
    /// Opens the database and constructs every external client once.
    pub fn init(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!(
            network = %config.ledger.network,
            app_id = config.ledger.app_id,
            "Starting IdeaVault"
        );

        let db_path = std::path::Path::new(&config.database.path);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create data dir {:?}: {}", parent, e))?;
            }
        }
        let persistence: Arc<dyn Persistence> = Arc::new(Database::open(&config.database.path)?);

        let pinata = PinataClient::new(config.content_store.to_pinata_config())?;
        if !pinata.is_configured() {
            warn!("Pinata credentials not set; idea registration will fail until PINATA_JWT or PINATA_API_KEY/PINATA_SECRET_API_KEY are provided");
        }
        let content_store: Arc<dyn ContentStore> = Arc::new(pinata);

        let algod = AlgodClient::new(config.ledger.to_algod_config())?;
        match algod.service_address() {
            Some(address) => info!(service_address = %address, "Ledger service account loaded"),
            None => warn!("ALGORAND_DEPLOYER_MNEMONIC not set; ledger writes are disabled"),
        }
        if config.ledger.app_id == 0 {
            warn!("ALGORAND_APP_ID not set; ledger calls will be rejected by the node");
        }
        let ledger: Arc<dyn Ledger> = Arc::new(algod);

        let jwt = if config.server.dev_mode && config.auth.jwt_secret.is_empty() {
            warn!("Using development JWT secret; do not run like this in production");
            JwtKeys::new_dev()
        } else {
            JwtKeys::new(config.auth.jwt_secret.clone(), config.auth.token_expiry_secs)?
        };

        let registry = IdeaRegistry::new(
            persistence.clone(),
            content_store.clone(),
            ledger.clone(),
            Arc::new(SystemClock),
            ExplorerLinks::new(config.ledger.explorer_url.clone()),
        );

        let state = AppState::new(persistence, content_store, ledger, registry, jwt)
            .with_network(config.ledger.network.clone())
            .with_frontend_url(config.server.frontend_url.clone())
            .with_max_upload_bytes(config.server.max_upload_bytes);

        Ok(Server {
            config,
            state: Arc::new(state),
        })
    }

    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        api::run_api_server(self.state, &self.config.server.listen).await
    }
}
