// ═══════════════════════════════════════════════════════════════
// AWS Signature Version 4 (SigV4) Signing
// ═══════════════════════════════════════════════════════════════
//
// Signs Secrets Manager calls. Every request is a POST to the
// service root with a JSON body and an `X-Amz-Target` header naming
// the operation. The signature covers:
//   - HTTP method, canonical URI, query string
//   - host, content-type and every x-amz-* header (sorted)
//   - SHA-256 hash of the request body
//
// Temporary credentials (Lambda, ECS task roles) add an
// `X-Amz-Security-Token` header, which is signed with the rest.
//
// Reference: https://docs.aws.amazon.com/IAM/latest/UserGuide/reference_aws-signing.html

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Long-lived or temporary AWS credentials.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// SHA-256 hash of data, returned as lowercase hex string.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// HMAC-SHA256 signing.
fn hmac_sha256(key: &[u8], msg: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("SigV4: invalid HMAC key: {}", e))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the SigV4 signing key.
/// key = HMAC("AWS4" + secret, date) → HMAC(_, region) → HMAC(_, service) → HMAC(_, "aws4_request")
fn derive_signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> anyhow::Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sign a request and inject `Authorization`, `X-Amz-Date`,
/// `X-Amz-Content-Sha256` (and `X-Amz-Security-Token`, for temporary
/// credentials) into `headers`.
pub fn sign_request(
    method: &str,
    url: &str,
    headers: &mut HeaderMap,
    body: &[u8],
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
) -> anyhow::Result<()> {
    sign_request_at(method, url, headers, body, credentials, region, service, Utc::now())
}

#[allow(clippy::too_many_arguments)]
fn sign_request_at(
    method: &str,
    url: &str,
    headers: &mut HeaderMap,
    body: &[u8],
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let parsed_url = Url::parse(url).map_err(|e| anyhow::anyhow!("SigV4: invalid URL: {}", e))?;
    let host = match (parsed_url.host_str(), parsed_url.port()) {
        (Some(h), Some(p)) => format!("{}:{}", h, p),
        (Some(h), None) => h.to_string(),
        (None, _) => anyhow::bail!("SigV4: URL has no host"),
    };
    let canonical_uri = if parsed_url.path().is_empty() { "/" } else { parsed_url.path() };

    // Canonical query string (sorted)
    let mut query_pairs: Vec<(String, String)> = parsed_url
        .query_pairs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    query_pairs.sort();
    let canonical_querystring: String = query_pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let payload_hash = sha256_hex(body);

    headers.insert(
        HeaderName::from_static("x-amz-date"),
        HeaderValue::from_str(&amz_date)?,
    );
    headers.insert(
        HeaderName::from_static("x-amz-content-sha256"),
        HeaderValue::from_str(&payload_hash)?,
    );
    if let Some(token) = &credentials.session_token {
        headers.insert(
            HeaderName::from_static("x-amz-security-token"),
            HeaderValue::from_str(token)?,
        );
    }
    headers.insert(reqwest::header::HOST, HeaderValue::from_str(&host)?);

    // Canonical headers: host, content-type and all x-amz-*, sorted by name
    let mut signed_header_list: Vec<String> = headers
        .keys()
        .map(|name| name.as_str().to_string())
        .filter(|name| name == "host" || name == "content-type" || name.starts_with("x-amz-"))
        .collect();
    signed_header_list.sort();
    signed_header_list.dedup();
    let signed_headers = signed_header_list.join(";");

    let mut canonical_headers_str = String::new();
    for name in &signed_header_list {
        let value = headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        canonical_headers_str.push_str(&format!("{}:{}\n", name, value.trim()));
    }

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        canonical_uri,
        canonical_querystring,
        canonical_headers_str,
        signed_headers,
        payload_hash
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key =
        derive_signing_key(&credentials.secret_access_key, &date_stamp, region, service)?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, credential_scope, signed_headers, signature
    );

    headers.insert(
        reqwest::header::AUTHORIZATION,
        HeaderValue::from_str(&authorization)?,
    );

    Ok(())
}
