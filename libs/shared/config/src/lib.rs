use std::env;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_PAGINATION_LIMIT: usize = 10;
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Optional service key sent as bearer on document store requests.
    pub supabase_service_key: Option<String>,
    /// Page size of the paginated appointment listings.
    pub pagination_limit: usize,
    pub push_registration_token: Option<String>,
    pub bind_address: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            supabase_service_key: None,
            pagination_limit: DEFAULT_PAGINATION_LIMIT,
            push_registration_token: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_key: non_empty_var("SUPABASE_SERVICE_ROLE_KEY"),
            pagination_limit: parse_pagination_limit(env::var("PAGINATION_LIMIT").ok().as_deref()),
            push_registration_token: non_empty_var("PUSH_REGISTRATION_TOKEN"),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// True when a remote document store is reachable, otherwise the
    /// in-memory store is used.
    pub fn has_document_store(&self) -> bool {
        !self.supabase_url.is_empty()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_pagination_limit(raw: Option<&str>) -> usize {
    match raw {
        None => DEFAULT_PAGINATION_LIMIT,
        Some(value) => match value.trim().parse::<usize>() {
            Ok(limit) if limit > 0 => limit,
            _ => {
                warn!("PAGINATION_LIMIT '{}' is invalid, using {}", value, DEFAULT_PAGINATION_LIMIT);
                DEFAULT_PAGINATION_LIMIT
            }
        },
    }
}
