//! Role-scoped idea listing, detail access and live re-verification

use crate::auth::AuthUser;
use crate::crypto;
use crate::error::VaultError;
use crate::ledger::{Ledger, OnChainRecord, VerificationStatus};
use crate::models::{now_timestamp, IdeaRecord, Role, Visibility};
use crate::persistence::{IdeaFilter, Persistence};
use crate::registry::ExplorerLinks;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: u64 = 12;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Query-string parameters of the listing endpoint, kept as raw strings so
/// malformed values surface as validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub stage: Option<String>,
    pub location: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdeaPage {
    pub ideas: Vec<IdeaRecord>,
    pub total: u64,
    pub page: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_ideas: u64,
    pub verified_ideas: u64,
    pub on_chain_total: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub verified: bool,
    pub status: VerificationStatus,
    pub idea_hash: String,
    pub txn_id: String,
    pub app_id: String,
    pub explorer_link: String,
    pub app_link: String,
    pub on_chain_data: Option<OnChainRecord>,
    pub verified_at: String,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_number(name: &str, value: &Option<String>, default: u64) -> Result<u64, VaultError> {
    match non_empty(value) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| VaultError::Validation(format!("{} must be a positive integer: {}", name, raw))),
        None => Ok(default),
    }
}

/// Base filter for what `user` may list: founders see their own ideas,
/// investors see public verified ones.
pub fn scope_filter(user: &AuthUser) -> IdeaFilter {
    match user.role {
        Role::Founder => IdeaFilter {
            founder_id: Some(user.id.clone()),
            ..IdeaFilter::default()
        },
        Role::Investor => IdeaFilter {
            public_verified_only: true,
            ..IdeaFilter::default()
        },
    }
}

pub fn list_ideas(
    persistence: &dyn Persistence,
    user: &AuthUser,
    query: &ListQuery,
) -> Result<IdeaPage, VaultError> {
    let mut filter = scope_filter(user);
    if let Some(category) = non_empty(&query.category) {
        filter.category = Some(category.parse()?);
    }
    if let Some(stage) = non_empty(&query.stage) {
        filter.stage = Some(stage.parse()?);
    }
    filter.location = non_empty(&query.location);
    filter.search = non_empty(&query.search);

    let page = parse_number("page", &query.page, 1)?.max(1);
    let limit = parse_number("limit", &query.limit, DEFAULT_PAGE_SIZE)?.clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(limit);

    let total = persistence.count_ideas(&filter)?;
    let ideas = persistence.list_ideas(&filter, offset, limit)?;
    debug!(role = %user.role, total, page, "query.list_ideas");

    Ok(IdeaPage {
        ideas,
        total,
        page,
        pages: (total + limit - 1) / limit,
    })
}

/// PRIVATE ideas are visible to their founder only.
pub fn can_view(idea: &IdeaRecord, user: &AuthUser) -> bool {
    idea.visibility != Visibility::Private || idea.founder_id == user.id
}

pub fn fetch_idea(
    persistence: &dyn Persistence,
    user: &AuthUser,
    id: &str,
) -> Result<IdeaRecord, VaultError> {
    let idea = persistence
        .find_idea(id)?
        .ok_or_else(|| VaultError::NotFound("Idea not found".to_string()))?;
    if !can_view(&idea, user) {
        return Err(VaultError::Forbidden("This idea is private".to_string()));
    }
    Ok(idea)
}

/// Asks the ledger again whether the idea's hash is registered. Always a
/// live query; the stored flag follows definite answers only.
pub async fn reverify(
    persistence: &dyn Persistence,
    ledger: &dyn Ledger,
    links: &ExplorerLinks,
    user: &AuthUser,
    id: &str,
) -> Result<VerificationReport, VaultError> {
    let idea = fetch_idea(persistence, user, id)?;
    let hash = crypto::hash_bytes_from_hex(&idea.idea_hash)?;

    let status = ledger.verification_status(&hash).await;
    let on_chain_data = if status == VerificationStatus::Verified {
        ledger.get_record(&hash).await
    } else {
        None
    };

    let verified = status == VerificationStatus::Verified;
    if status != VerificationStatus::QueryFailed && verified != idea.is_verified {
        if let Err(e) = persistence.set_idea_verified(&idea.id, verified) {
            warn!("Failed to update verification flag for {}: {}", idea.id, e);
        }
    }

    Ok(VerificationReport {
        verified,
        status,
        explorer_link: links.tx(&idea.txn_id),
        app_link: links.application(&idea.app_id),
        idea_hash: idea.idea_hash,
        txn_id: idea.txn_id,
        app_id: idea.app_id,
        on_chain_data,
        verified_at: now_timestamp(),
    })
}

pub async fn platform_stats(
    persistence: &dyn Persistence,
    ledger: &dyn Ledger,
) -> Result<PlatformStats, VaultError> {
    let total_ideas = persistence.count_all_ideas(false)?;
    let verified_ideas = persistence.count_all_ideas(true)?;
    let on_chain_total = ledger.total_registered().await;
    Ok(PlatformStats {
        total_ideas,
        verified_ideas,
        on_chain_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Stage};
    use crate::persistence::Database;

    fn user(id: &str, role: Role) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            name: id.to_uppercase(),
            email: format!("{}@example.com", id),
            role,
            wallet_address: None,
        }
    }

    fn record(founder_id: &str, visibility: Visibility) -> IdeaRecord {
        IdeaRecord {
            id: "idea-1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            category: Category::Saas,
            stage: Stage::Growth,
            location: None,
            funding_goal: None,
            team_size: None,
            visibility,
            idea_hash: "00".repeat(32),
            txn_id: "TX".to_string(),
            app_id: "1".to_string(),
            block_timestamp: 0,
            content_cid: "Qm".to_string(),
            pitch_deck_cid: None,
            registered_at: now_timestamp(),
            is_verified: true,
            founder_id: founder_id.to_string(),
            created_at: now_timestamp(),
            founder: None,
        }
    }

    #[test]
    fn test_scope_filter_by_role() {
        let founder = scope_filter(&user("f1", Role::Founder));
        assert_eq!(founder.founder_id.as_deref(), Some("f1"));
        assert!(!founder.public_verified_only);

        let investor = scope_filter(&user("i1", Role::Investor));
        assert!(investor.founder_id.is_none());
        assert!(investor.public_verified_only);
    }

    #[test]
    fn test_private_visible_to_owner_only() {
        let idea = record("f1", Visibility::Private);
        assert!(can_view(&idea, &user("f1", Role::Founder)));
        assert!(!can_view(&idea, &user("f2", Role::Founder)));
        assert!(!can_view(&idea, &user("i1", Role::Investor)));
        assert!(can_view(&record("f1", Visibility::NdaRequired), &user("i1", Role::Investor)));
    }

    #[test]
    fn test_pagination_defaults_and_caps() {
        let db = Database::open_in_memory().unwrap();
        let investor = user("i1", Role::Investor);

        let page = list_ideas(&db, &investor, &ListQuery::default()).unwrap();
        assert_eq!((page.total, page.page, page.pages), (0, 1, 0));

        let query = ListQuery {
            page: Some("0".to_string()),
            limit: Some("5000".to_string()),
            ..ListQuery::default()
        };
        assert_eq!(list_ideas(&db, &investor, &query).unwrap().page, 1);

        let bad = ListQuery {
            page: Some("two".to_string()),
            ..ListQuery::default()
        };
        assert!(matches!(list_ideas(&db, &investor, &bad), Err(VaultError::Validation(_))));

        let bad_category = ListQuery {
            category: Some("ROBOTICS".to_string()),
            ..ListQuery::default()
        };
        assert!(list_ideas(&db, &investor, &bad_category).is_err());
    }

    #[test]
    fn test_fetch_unknown_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = fetch_idea(&db, &user("f1", Role::Founder), "missing").unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }
}
