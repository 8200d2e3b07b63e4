//! Domain records shared by the persistence, workflow and API layers

use crate::error::VaultError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a closed, upper-snake-case string enum with `as_str`,
/// `Display` and `FromStr`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = VaultError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(VaultError::Validation(format!(
                        "invalid {}: {}",
                        stringify!($name).to_lowercase(),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(
    /// Account role. Fixed at sign-up.
    Role {
        Founder => "FOUNDER",
        Investor => "INVESTOR",
    }
);

string_enum!(
    Category {
        Fintech => "FINTECH",
        Healthtech => "HEALTHTECH",
        Edtech => "EDTECH",
        Agritech => "AGRITECH",
        Ecommerce => "ECOMMERCE",
        Saas => "SAAS",
        AiMl => "AI_ML",
        Blockchain => "BLOCKCHAIN",
        Sustainability => "SUSTAINABILITY",
        Gaming => "GAMING",
        Social => "SOCIAL",
        Other => "OTHER",
    }
);

string_enum!(
    Stage {
        Idea => "IDEA",
        Mvp => "MVP",
        EarlyTraction => "EARLY_TRACTION",
        Growth => "GROWTH",
        Scaling => "SCALING",
    }
);

string_enum!(
    Visibility {
        Public => "PUBLIC",
        Private => "PRIVATE",
        NdaRequired => "NDA_REQUIRED",
    }
);

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Public
    }
}

/// Registered platform user. The password hash never leaves the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub company: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub linkedin_url: Option<String>,
    pub wallet_address: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
}

/// Fields supplied at sign-up
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub company: Option<String>,
    pub location: Option<String>,
}

/// Public projection of an idea's founder
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FounderSummary {
    pub id: String,
    pub name: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub wallet_address: Option<String>,
    pub is_verified: bool,
}

/// One registered idea together with its on-chain proof fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub stage: Stage,
    pub location: Option<String>,
    pub funding_goal: Option<f64>,
    pub team_size: Option<u32>,
    pub visibility: Visibility,
    /// Hex SHA-256 over `title|description|registered_at`
    pub idea_hash: String,
    pub txn_id: String,
    pub app_id: String,
    pub block_timestamp: u64,
    #[serde(rename = "ipfsCid")]
    pub content_cid: String,
    pub pitch_deck_cid: Option<String>,
    /// ISO-8601 timestamp folded into `idea_hash`
    pub registered_at: String,
    pub is_verified: bool,
    pub founder_id: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub founder: Option<FounderSummary>,
}

/// Investor bookmark keyed by `(investor_id, idea_id)`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistEntry {
    pub investor_id: String,
    pub idea_id: String,
    pub note: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idea_title: Option<String>,
}

/// Sender or receiver projection attached to messages
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub idea_id: String,
    pub content: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idea_title: Option<String>,
}

/// Current time in the fixed-width RFC 3339 form used for all stored
/// timestamps, so lexical order matches chronological order.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
