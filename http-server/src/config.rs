use rand::Rng;
use rand::distributions::Alphanumeric;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:6957";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Mixed into every session token
    pub session_secret: String,
    /// Admin routes answer 403 while this is unset
    pub admin_secret: Option<String>,
    /// JSON catalog loaded at startup and by the admin reload route
    pub catalog_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let session_secret = match non_empty("SESSION_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("SESSION_SECRET not set, sessions will not survive a restart");
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(32)
                    .map(char::from)
                    .collect()
            }
        };

        Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            session_secret,
            admin_secret: non_empty("ADMIN_SECRET"),
            catalog_path: non_empty("CATALOG_PATH").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = ServerConfig::from_lookup(|_| None);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.session_secret.len(), 32);
        assert!(config.admin_secret.is_none());
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_reads_values_and_ignores_blank() {
        let env: HashMap<&str, &str> = [
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("SESSION_SECRET", "s3cret"),
            ("ADMIN_SECRET", "   "),
            ("CATALOG_PATH", "/etc/reels/catalog.json"),
        ]
        .into_iter()
        .collect();
        let config = ServerConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.session_secret, "s3cret");
        assert!(config.admin_secret.is_none());
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("/etc/reels/catalog.json"))
        );
    }
}
