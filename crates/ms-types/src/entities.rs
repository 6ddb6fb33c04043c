//! Core entity types shared across the gateway
//!
//! These are the semantic types; their persistence representation is the
//! store's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a provider expects its API key on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Custom header named by `auth_header_name`
    Header,
    /// Key appended as a query parameter
    Query,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Bearer => "bearer",
            AuthMethod::Header => "header",
            AuthMethod::Query => "query",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bearer" => Some(AuthMethod::Bearer),
            "header" => Some(AuthMethod::Header),
            "query" => Some(AuthMethod::Query),
            _ => None,
        }
    }
}

/// Last observed reachability of a provider. Identity is immutable; this is
/// the only hot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Online,
    Offline,
    Unknown,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Online => "online",
            ProviderStatus::Offline => "offline",
            ProviderStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(ProviderStatus::Online),
            "offline" => Some(ProviderStatus::Offline),
            "unknown" => Some(ProviderStatus::Unknown),
            _ => None,
        }
    }
}

/// An upstream LLM provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Stable identifier, e.g. "openai"
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub auth_method: AuthMethod,
    /// Header name when `auth_method` is `Header`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header_name: Option<String>,
    pub status: ProviderStatus,
    pub created_at: DateTime<Utc>,
}

/// Optional per-window budgets. `None` means unlimited for that dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<u32>,
}

impl Limits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_unlimited(&self) -> bool {
        self.rpm.is_none() && self.tpm.is_none() && self.daily.is_none()
    }
}

/// A provider API key.
///
/// The plaintext secret is never part of this struct and never persisted;
/// only its hash travels here. The key manager holds the plaintext in memory
/// for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub provider_id: String,
    /// SHA-256 hex of the secret; the stable identity used to look up the
    /// in-memory plaintext
    pub key_hash: String,
    /// First characters of the secret, for display only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_interval: Option<String>,
    pub requests_count: u64,
    pub tokens_count: u64,
    pub active: bool,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// True while the degradation cooldown is still running.
    pub fn currently_degraded(&self, now: DateTime<Utc>) -> bool {
        match self.degraded_until {
            Some(until) => self.degraded && until > now,
            None => false,
        }
    }
}

/// Per-client request defaults applied at resolution time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Providers to try first when no remap rule names one, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_priority: Vec<String>,
}

/// A registered API consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Slug plus random suffix, e.g. "claude-code-9f3ab1"
    pub id: String,
    pub name: String,
    pub version: String,
    /// 256-bit random hex bearer token. Treated as a secret; persisted only
    /// as a lookup key, never logged.
    pub token: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub config: ClientConfig,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Windowed quota row for a client. Counters are mutated only through the
/// store's atomic check-and-increment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRateLimit {
    pub client_id: String,
    #[serde(default)]
    pub limits: Limits,
    pub current_rpm: u32,
    pub current_tpm: u64,
    pub current_daily: u32,
    pub last_reset: DateTime<Utc>,
}

/// A name-only model rewrite, global (`client_id: None`) or per-client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub model_id: String,
}

/// A per-client, priority-ranked rewrite from an incoming model pattern to a
/// concrete (model, provider) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemapRule {
    pub id: i64,
    pub client_id: String,
    /// Glob where `*` matches one-or-more characters; all else literal
    pub from_model: String,
    pub to_model: String,
    pub to_provider: String,
    /// Higher wins; ties broken by lowest id
    pub priority: i32,
    pub enabled: bool,
}

/// Append-only usage log entry. The core writes these and never reads them
/// on the hot path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub provider_id: String,
    pub key_id: i64,
    pub model_id: String,
    pub request_tokens: u64,
    pub response_tokens: u64,
    pub latency_ms: u64,
    pub success: bool,
}

/// The quota dimension that denied an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitDimension {
    Rpm,
    Tpm,
    Daily,
}

impl RateLimitDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitDimension::Rpm => "rpm",
            RateLimitDimension::Tpm => "tpm",
            RateLimitDimension::Daily => "daily",
        }
    }
}

impl std::fmt::Display for RateLimitDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the admission pipeline hands to the proxy layer on acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionDecision {
    /// None for anonymous (optional-auth) requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub model: String,
    pub provider_id: String,
    pub key_id: i64,
    pub key_hash: String,
}

/// Classified result of an upstream call, reported back after the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamOutcome {
    Success,
    /// 401/403/429/quota-exhausted: the key itself is at fault and should
    /// cool down
    KeyFault,
    /// Any other failure; usage is recorded but the key stays healthy
    Failure,
}

impl UpstreamOutcome {
    /// Classify an upstream HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => UpstreamOutcome::Success,
            401 | 403 | 429 => UpstreamOutcome::KeyFault,
            _ => UpstreamOutcome::Failure,
        }
    }
}
