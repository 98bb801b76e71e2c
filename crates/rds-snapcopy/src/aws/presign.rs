//! SigV4 query-string signing for `CopyDBSnapshot`.
//!
//! Encrypted cross-region copies must carry a URL pre-signed against the
//! source region. The target region replays that request to read the
//! source snapshot on the caller's behalf.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::CopySnapshotRequest;
use crate::error::{CopierError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "rds";
const API_VERSION: &str = "2014-10-31";

/// Static credentials used to sign one request.
#[derive(Clone)]
pub struct SigningCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Signs `CopyDBSnapshot` requests for one source region.
pub struct CopyPresigner {
    credentials: SigningCredentials,
    region: String,
}

impl CopyPresigner {
    /// Create a presigner bound to `region`.
    pub fn new(credentials: SigningCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Endpoint host of the region's RDS API.
    pub fn host(&self) -> String {
        format!("rds.{}.amazonaws.com", self.region)
    }

    /// Build the pre-signed URL for `request`, valid for `expires_in` from `now`.
    pub fn presign(&self, request: &CopySnapshotRequest, expires_in: Duration, now: DateTime<Utc>) -> Result<String> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = &amz_date[..8];
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, SERVICE);
        let host = self.host();

        let mut params = BTreeMap::new();
        params.insert("Action", "CopyDBSnapshot".to_string());
        params.insert("Version", API_VERSION.to_string());
        params.insert("SourceDBSnapshotIdentifier", request.source_snapshot_arn.clone());
        params.insert("TargetDBSnapshotIdentifier", request.target_identifier.clone());
        params.insert("DestinationRegion", request.destination_region.clone());
        if let Some(key) = &request.kms_key_id {
            params.insert("KmsKeyId", key.clone());
        }
        params.insert("X-Amz-Algorithm", ALGORITHM.to_string());
        params.insert(
            "X-Amz-Credential",
            format!("{}/{}", self.credentials.access_key_id, scope),
        );
        params.insert("X-Amz-Date", amz_date.clone());
        params.insert("X-Amz-Expires", expires_in.as_secs().to_string());
        params.insert("X-Amz-SignedHeaders", "host".to_string());
        if let Some(token) = &self.credentials.session_token {
            params.insert("X-Amz-Security-Token", token.clone());
        }

        let query = canonical_query(&params);
        let canonical_request = format!(
            "GET\n/\n{}\nhost:{}\n\nhost\n{}",
            query,
            host,
            hex::encode(Sha256::digest(b""))
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let key = signing_key(&self.credentials.secret_access_key, date, &self.region, SERVICE)?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        Ok(format!("https://{}/?{}&X-Amz-Signature={}", host, query, signature))
    }
}

fn canonical_query(params: &BTreeMap<&str, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode everything except the RFC 3986 unreserved set.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| CopierError::Presign {
        message: e.to_string(),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
