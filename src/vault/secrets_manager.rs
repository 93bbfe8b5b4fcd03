//! AWS Secrets Manager client speaking the JSON 1.1 protocol directly.
//!
//! Every operation is a signed `POST /` whose `X-Amz-Target` header names the
//! action. Errors come back as `{"__type": "...#ResourceNotFoundException",
//! "message": "..."}` with a 4xx/5xx status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::sigv4::{self, AwsCredentials};
use super::SecretStore;
use crate::config::Config;
use crate::models::{SecretMetadata, Stage};

const SERVICE: &str = "secretsmanager";
const TARGET_PREFIX: &str = "secretsmanager.";
const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.1";

#[derive(Debug, Error)]
pub enum SecretsManagerError {
    #[error("{kind}: {message}")]
    Service {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request signing failed: {0}")]
    Signing(anyhow::Error),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SecretsManagerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SecretsManagerError::Service { kind, .. } if kind == "ResourceNotFoundException")
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueResponse {
    secret_string: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRandomPasswordResponse {
    random_password: String,
}

pub struct SecretsManagerClient {
    http: reqwest::Client,
    endpoint: String,
    region: String,
    credentials: AwsCredentials,
}

impl SecretsManagerClient {
    pub fn new(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        credentials: AwsCredentials,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            region: region.into(),
            credentials,
        })
    }

    /// Regional endpoint unless the config overrides it (LocalStack, VPC endpoints).
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let credentials = cfg.aws_credentials()?;
        let endpoint = cfg
            .secrets_manager_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://secretsmanager.{}.amazonaws.com", cfg.aws_region));
        Self::new(
            endpoint,
            cfg.aws_region.clone(),
            credentials,
            Duration::from_secs(cfg.http_timeout_secs),
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        payload: Value,
    ) -> Result<T, SecretsManagerError> {
        let body = serde_json::to_vec(&payload)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
        headers.insert(
            "x-amz-target",
            HeaderValue::from_str(&format!("{}{}", TARGET_PREFIX, action))
                .map_err(|e| SecretsManagerError::Signing(e.into()))?,
        );
        sigv4::sign_request(
            "POST",
            &self.endpoint,
            &mut headers,
            &body,
            &self.credentials,
            &self.region,
            SERVICE,
        )
        .map_err(SecretsManagerError::Signing)?;

        tracing::debug!(action, "secrets manager request");

        let resp = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let parsed: ErrorBody = serde_json::from_slice(&bytes).unwrap_or(ErrorBody {
                kind: String::new(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
            // "com.amazonaws.secretsmanager#ResourceNotFoundException" → short name
            let kind = parsed
                .kind
                .rsplit('#')
                .next()
                .filter(|k| !k.is_empty())
                .unwrap_or("UnknownError")
                .to_string();
            return Err(SecretsManagerError::Service {
                status: status.as_u16(),
                kind,
                message: parsed.message,
            });
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SecretStore for SecretsManagerClient {
    async fn describe_secret(&self, secret_id: &str) -> anyhow::Result<SecretMetadata> {
        Ok(self
            .call("DescribeSecret", json!({ "SecretId": secret_id }))
            .await?)
    }

    async fn get_secret_value(
        &self,
        secret_id: &str,
        stage: Stage,
        version_id: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        let mut payload = json!({ "SecretId": secret_id, "VersionStage": stage.label() });
        if let Some(version) = version_id {
            payload["VersionId"] = json!(version);
        }

        match self.call::<GetSecretValueResponse>("GetSecretValue", payload).await {
            Ok(resp) => Ok(resp.secret_string),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        version_id: &str,
        secret_string: &str,
        stages: &[Stage],
    ) -> anyhow::Result<()> {
        let labels: Vec<&str> = stages.iter().map(|s| s.label()).collect();
        self.call::<Value>(
            "PutSecretValue",
            json!({
                "SecretId": secret_id,
                "ClientRequestToken": version_id,
                "SecretString": secret_string,
                "VersionStages": labels,
            }),
        )
        .await?;
        Ok(())
    }

    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: Stage,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut payload = json!({
            "SecretId": secret_id,
            "VersionStage": stage.label(),
            "MoveToVersionId": move_to,
        });
        if let Some(version) = remove_from {
            payload["RemoveFromVersionId"] = json!(version);
        }
        self.call::<Value>("UpdateSecretVersionStage", payload).await?;
        Ok(())
    }

    async fn get_random_password(
        &self,
        length: u32,
        exclude_characters: &str,
    ) -> anyhow::Result<String> {
        let resp: GetRandomPasswordResponse = self
            .call(
                "GetRandomPassword",
                json!({
                    "PasswordLength": length,
                    "ExcludeCharacters": exclude_characters,
                }),
            )
            .await?;
        Ok(resp.random_password)
    }
}
