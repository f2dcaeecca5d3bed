use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Supabase,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "in-memory" => Ok(StorageBackend::Memory),
            "supabase" | "postgrest" => Ok(StorageBackend::Supabase),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Knobs for pattern compilation, materialization and the read path.
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Fixed slot length. Patterns asking for anything else are rejected
    /// unless `allow_custom_slot_duration` is set.
    pub slot_duration_minutes: i64,
    pub allow_custom_slot_duration: bool,
    /// Reject patterns whose date window contains no matching weekday
    /// instead of materializing zero slots.
    pub reject_empty_recurrence: bool,
    pub persistence_retry_backoff_ms: u64,
    pub max_query_range_days: i64,
    /// Write-path bounds: longest pattern window and most slots one
    /// pattern may materialize.
    pub max_pattern_range_days: i64,
    pub max_pattern_slots: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_duration_minutes: 45,
            allow_custom_slot_duration: false,
            reject_empty_recurrence: true,
            persistence_retry_backoff_ms: 200,
            max_query_range_days: 92,
            max_pattern_range_days: 1830,
            max_pattern_slots: 10_000,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub storage_backend: StorageBackend,
    pub port: u16,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SchedulingConfig::default();

        let scheduling = SchedulingConfig {
            slot_duration_minutes: parse_var("SLOT_DURATION_MINUTES", defaults.slot_duration_minutes),
            allow_custom_slot_duration: parse_var("ALLOW_CUSTOM_SLOT_DURATION", defaults.allow_custom_slot_duration),
            reject_empty_recurrence: parse_var("REJECT_EMPTY_RECURRENCE", defaults.reject_empty_recurrence),
            persistence_retry_backoff_ms: parse_var("PERSISTENCE_RETRY_BACKOFF_MS", defaults.persistence_retry_backoff_ms),
            max_query_range_days: parse_var("MAX_QUERY_RANGE_DAYS", defaults.max_query_range_days),
            max_pattern_range_days: parse_var("MAX_PATTERN_RANGE_DAYS", defaults.max_pattern_range_days),
            max_pattern_slots: parse_var("MAX_PATTERN_SLOTS", defaults.max_pattern_slots),
            default_page_size: parse_var("DEFAULT_PAGE_SIZE", defaults.default_page_size),
            max_page_size: parse_var("MAX_PAGE_SIZE", defaults.max_page_size),
        };

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
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            storage_backend: parse_var("STORAGE_BACKEND", StorageBackend::Memory),
            port: parse_var("PORT", 3000),
            scheduling,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if config.storage_backend == StorageBackend::Supabase && !config.is_store_configured() {
            warn!("STORAGE_BACKEND=supabase but SUPABASE_URL or SUPABASE_SERVICE_ROLE_KEY is missing");
        }

        config
    }

    /// Authentication needs at least the JWT secret.
    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_store_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_service_role_key.is_empty()
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => parse_or_default(name, &raw, default),
        Err(_) => default,
    }
}

fn parse_or_default<T>(name: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!("{} has invalid value '{}', using default {:?}", name, raw, default);
            default
        }
    }
}
