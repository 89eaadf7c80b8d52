use std::env;

/// One year. Larger values are clamped.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub db_max_connections: u32,
    /// Run the slot rule on create too. Off keeps create unchecked.
    pub enforce_slot_on_create: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let session_ttl_hours = var("SESSION_TTL_HOURS")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .map(|h| h.min(MAX_SESSION_TTL_HOURS))
            .unwrap_or(24);
        let db_max_connections = var("DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(5);
        let enforce_slot_on_create = var("ENFORCE_SLOT_ON_CREATE")
            .map(|s| parse_flag(&s))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            db_max_connections,
            enforce_slot_on_create,
        })
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
