//! Core data type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::logging::LoggingConfig;

/// Application-defined user record
///
/// Only `id` is interpreted by warden; every other field passes through
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Copy of the record without falsy fields (null, false, 0, "")
    pub fn compacted(&self) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(_, value)| !is_falsy(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            id: self.id.clone(),
            fields,
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Server-side record binding a token to a user and an expiry instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserRecord,
    /// Unix epoch milliseconds; `0` marks a revoked session
    pub expires_at_ms: i64,
}

impl Session {
    pub fn new(token: impl Into<String>, user: UserRecord, expires_at_ms: i64) -> Self {
        Self {
            token: token.into(),
            user,
            expires_at_ms,
        }
    }

    /// A session is valid strictly before its expiry instant.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }

    /// Remaining lifetime in whole seconds, rounded up, never below one.
    pub fn remaining_ttl_seconds(&self, now_ms: i64) -> u64 {
        let remaining_ms = (self.expires_at_ms - now_ms).max(0) as u64;
        remaining_ms.div_ceil(1000).max(1)
    }
}

/// Transport-independent view of the parts of an HTTP request that the
/// session manager looks at.
#[derive(Debug, Clone, Default)]
pub struct ClientRequest {
    pub method: String,
    pub url: String,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    /// Client address reported by a trusted reverse proxy
    pub forwarded_ip: Option<String>,
    /// Address of the connected peer
    pub peer_ip: Option<IpAddr>,
    /// Percent-decoded session token from the identity cookie
    pub token: Option<String>,
}

impl ClientRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_forwarded_ip(mut self, ip: impl Into<String>) -> Self {
        self.forwarded_ip = Some(ip.into());
        self
    }

    pub fn with_peer_ip(mut self, ip: IpAddr) -> Self {
        self.peer_ip = Some(ip);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// POST, PUT and DELETE, compared case-insensitively
    pub fn is_mutating(&self) -> bool {
        ["post", "put", "delete"]
            .iter()
            .any(|m| self.method.eq_ignore_ascii_case(m))
    }

    /// Client address, preferring the proxy-supplied one.
    ///
    /// Trusting the forwarded address is only correct behind a reverse proxy
    /// that overwrites it.
    pub fn client_ip(&self) -> String {
        self.forwarded_ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .or_else(|| self.peer_ip.map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Outcome of session resolution for one request
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Token bound to this client
    pub token: String,
    /// Set when the token was generated for this request and must be sent
    /// back in a cookie
    pub issued: bool,
    /// Present only for a live session
    pub user: Option<UserRecord>,
}

impl Identity {
    pub fn anonymous(token: impl Into<String>, issued: bool) -> Self {
        Self {
            token: token.into(),
            issued,
            user: None,
        }
    }

    pub fn authenticated(token: impl Into<String>, user: UserRecord) -> Self {
        Self {
            token: token.into(),
            issued: false,
            user: Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }
}

/// Controller/action pair a route resolves to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteTarget {
    pub controller: String,
    pub action: String,
}

impl RouteTarget {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
        }
    }
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.controller, self.action)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    pub identity: IdentityConfig,
    pub authorization: AuthorizationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Prefix for the cookie name and the store keys
    pub app_name: String,
    /// HMAC key used to derive tokens
    pub secret_key: String,
    /// Sliding session lifetime
    pub session_ttl_seconds: u64,
    /// Suffix the `Origin` header of mutating requests must end with
    pub trusted_origin: String,
    #[serde(default = "default_cookie_lifetime_days")]
    pub cookie_lifetime_days: u32,
}

fn default_cookie_lifetime_days() -> u32 {
    3650
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    pub login_url: String,
    /// Require authentication for actions no policy covers
    #[serde(default)]
    pub default_deny: bool,
    #[serde(default)]
    pub controllers: Vec<ControllerPolicyConfig>,
}

/// Declarative policy for one controller, registered at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerPolicyConfig {
    pub name: String,
    /// Class-level roles; `Some(vec![])` requires authentication only
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub actions: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub anonymous: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}
