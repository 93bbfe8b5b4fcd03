use std::str::FromStr;

use anyhow::Context;
use sqlx::postgres::PgSslMode;

use crate::rotation::RotationSettings;
use crate::vault::sigv4::AwsCredentials;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub aws_region: String,
    /// Overrides the regional Secrets Manager endpoint (LocalStack, VPC endpoint).
    pub secrets_manager_endpoint: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub http_timeout_secs: u64,
    /// Length of passwords requested from the store.
    /// Set via ROTATOR_PASSWORD_LENGTH env var. Default: 128.
    pub password_length: u32,
    /// Characters the store must leave out of generated passwords.
    /// Set via ROTATOR_EXCLUDE_CHARACTERS env var. Default: `/"@`.
    pub exclude_characters: String,
    /// Port used when a credential record carries none.
    pub db_port: u16,
    pub db_connect_timeout_secs: u64,
    pub db_ssl_mode: String,
}

impl Config {
    pub fn rotation_settings(&self) -> RotationSettings {
        RotationSettings {
            password_length: self.password_length,
            exclude_characters: self.exclude_characters.clone(),
        }
    }

    pub fn aws_credentials(&self) -> anyhow::Result<AwsCredentials> {
        Ok(AwsCredentials {
            access_key_id: self
                .aws_access_key_id
                .clone()
                .context("AWS_ACCESS_KEY_ID is not set")?,
            secret_access_key: self
                .aws_secret_access_key
                .clone()
                .context("AWS_SECRET_ACCESS_KEY is not set")?,
            session_token: self.aws_session_token.clone(),
        })
    }

    pub fn ssl_mode(&self) -> anyhow::Result<PgSslMode> {
        PgSslMode::from_str(&self.db_ssl_mode)
            .with_context(|| format!("invalid ROTATOR_DB_SSL_MODE '{}'", self.db_ssl_mode))
    }
}

fn env_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    lookup(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_opt(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|name| std::env::var(name).ok())
}

/// Build the config from `lookup` (the process environment in [`load`]).
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Config> {
    let cfg = Config {
        port: env_or(&lookup, "ROTATOR_PORT", 8080),
        aws_region: env_opt(&lookup, "AWS_REGION")
            .or_else(|| env_opt(&lookup, "AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| "us-east-1".into()),
        secrets_manager_endpoint: env_opt(&lookup, "ROTATOR_SECRETS_MANAGER_ENDPOINT"),
        aws_access_key_id: env_opt(&lookup, "AWS_ACCESS_KEY_ID"),
        aws_secret_access_key: env_opt(&lookup, "AWS_SECRET_ACCESS_KEY"),
        aws_session_token: env_opt(&lookup, "AWS_SESSION_TOKEN"),
        http_timeout_secs: env_or(&lookup, "ROTATOR_HTTP_TIMEOUT_SECS", 30),
        password_length: env_or(&lookup, "ROTATOR_PASSWORD_LENGTH", 128),
        exclude_characters: lookup("ROTATOR_EXCLUDE_CHARACTERS").unwrap_or_else(|| "/\"@".into()),
        db_port: env_or(&lookup, "ROTATOR_DB_PORT", 5432),
        db_connect_timeout_secs: env_or(&lookup, "ROTATOR_DB_CONNECT_TIMEOUT_SECS", 5),
        db_ssl_mode: lookup("ROTATOR_DB_SSL_MODE").unwrap_or_else(|| "prefer".into()),
    };

    // Fail at startup rather than on the first probe.
    cfg.ssl_mode()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        from_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_with_empty_environment() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.aws_region, "us-east-1");
        assert_eq!(cfg.secrets_manager_endpoint, None);
        assert_eq!(cfg.http_timeout_secs, 30);
        assert_eq!(cfg.db_port, 5432);
        assert_eq!(cfg.db_connect_timeout_secs, 5);
        assert!(matches!(cfg.ssl_mode().unwrap(), PgSslMode::Prefer));

        let settings = cfg.rotation_settings();
        assert_eq!(settings.password_length, 128);
        assert_eq!(settings.exclude_characters, "/\"@");
    }

    #[test]
    fn test_overrides_and_fallbacks() {
        let cfg = config_from(&[
            ("AWS_DEFAULT_REGION", "eu-west-1"),
            ("ROTATOR_PASSWORD_LENGTH", "64"),
            ("ROTATOR_DB_PORT", "not-a-port"),
            ("ROTATOR_SECRETS_MANAGER_ENDPOINT", "http://localhost:4566"),
            ("ROTATOR_DB_SSL_MODE", "require"),
        ])
        .unwrap();
        assert_eq!(cfg.aws_region, "eu-west-1");
        assert_eq!(cfg.password_length, 64);
        assert_eq!(cfg.db_port, 5432, "unparseable numbers fall back to the default");
        assert_eq!(cfg.secrets_manager_endpoint.as_deref(), Some("http://localhost:4566"));
        assert!(matches!(cfg.ssl_mode().unwrap(), PgSslMode::Require));

        let cfg = config_from(&[("AWS_REGION", "ap-south-1"), ("AWS_DEFAULT_REGION", "eu-west-1")]).unwrap();
        assert_eq!(cfg.aws_region, "ap-south-1");
    }

    #[test]
    fn test_rejects_invalid_ssl_mode() {
        let err = config_from(&[("ROTATOR_DB_SSL_MODE", "sometimes")]).unwrap_err();
        assert!(err.to_string().contains("ROTATOR_DB_SSL_MODE"), "{}", err);
    }

    #[test]
    fn test_aws_credentials_require_key_pair() {
        let cfg = config_from(&[("AWS_ACCESS_KEY_ID", "AKIA")]).unwrap();
        assert!(cfg.aws_credentials().is_err());

        let cfg = config_from(&[
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", "token"),
        ])
        .unwrap();
        let creds = cfg.aws_credentials().unwrap();
        assert_eq!(creds.session_token.as_deref(), Some("token"));
    }
}
