use std::path::PathBuf;

use anyhow::{Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub avatar_dir: PathBuf,
    pub riff_dir: PathBuf,
    pub site_root: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("RYFF_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("RYFF_JWT_SECRET is unset or still a placeholder");
        }

        let port = or("RYFF_PORT", "3000");
        let Ok(port) = port.parse::<u16>() else {
            bail!("RYFF_PORT is not a valid port: {}", port);
        };

        Ok(Self {
            host: or("RYFF_HOST", "0.0.0.0"),
            port,
            db_path: or("RYFF_DB_PATH", "ryff.db").into(),
            jwt_secret,
            avatar_dir: or("RYFF_AVATAR_DIR", "./avatars").into(),
            riff_dir: or("RYFF_RIFF_DIR", "./riffs").into(),
            site_root: or("RYFF_SITE_ROOT", "http://localhost:3000"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[("RYFF_JWT_SECRET", "s3cr3t")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.db_path, PathBuf::from("ryff.db"));
        assert_eq!(config.riff_dir, PathBuf::from("./riffs"));
    }

    #[test]
    fn rejects_missing_or_placeholder_secret() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("RYFF_JWT_SECRET", "dev-secret-change-me")])).is_err());
    }

    #[test]
    fn rejects_bad_port() {
        let vars = [("RYFF_JWT_SECRET", "s3cr3t"), ("RYFF_PORT", "http")];
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }
}
