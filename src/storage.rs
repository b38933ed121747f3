use std::collections::BTreeMap;

use axum::http::Uri;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    settings::StorageSettings,
};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const MAX_EXPIRES_SECS: u64 = 604_800;
pub const DEFAULT_DOWNLOAD_EXPIRES_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize)]
pub struct UploadTicket {
    pub url: String,
    pub method: &'static str,
    pub key: String,
    pub bucket: String,
    pub headers: BTreeMap<&'static str, String>,
    pub expires: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadTicket {
    pub url: String,
    pub key: String,
    pub bucket: String,
}

/// Issues SigV4 presigned `PUT` and `GET` URLs for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct StorageGateway {
    settings: StorageSettings,
}

impl StorageGateway {
    pub fn new(settings: StorageSettings) -> Self {
        Self { settings }
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.settings.max_upload_bytes
    }

    /// Object keys are grouped by upload day: `YYYY-MM-DD/<uuid>`.
    pub fn new_key(now: DateTime<Utc>) -> String {
        format!("{}/{}", now.format("%Y-%m-%d"), Uuid::new_v4())
    }

    pub fn sign_upload(&self, mime: &str, size: u64, now: DateTime<Utc>) -> Result<UploadTicket> {
        if size > self.settings.max_upload_bytes {
            return Err(Error::UploadTooLarge {
                size,
                limit: self.settings.max_upload_bytes,
            });
        }
        let key = Self::new_key(now);
        let expires = self.settings.upload_expires_secs;
        let url = self.presign("PUT", &key, expires, now)?;
        log::debug!("signed upload of up to {} bytes to {}", size, key);
        Ok(UploadTicket {
            url,
            method: "PUT",
            key,
            bucket: self.settings.bucket.clone(),
            headers: BTreeMap::from([("Content-Type", mime.to_string())]),
            expires,
        })
    }

    pub fn sign_download(&self, key: &str, expires: u64, now: DateTime<Utc>) -> Result<DownloadTicket> {
        let expires = expires.clamp(1, MAX_EXPIRES_SECS);
        let url = self.presign("GET", key, expires, now)?;
        Ok(DownloadTicket {
            url,
            key: key.to_string(),
            bucket: self.settings.bucket.clone(),
        })
    }

    /// Builds a SigV4 query-string presigned URL that signs only the `host` header.
    pub fn presign(&self, method: &str, key: &str, expires: u64, now: DateTime<Utc>) -> Result<String> {
        if !self.is_configured() {
            return Err(Error::StorageUnavailable);
        }
        let s = &self.settings;
        let endpoint: Uri = s
            .endpoint
            .parse()
            .map_err(|e| Error::Signing(format!("endpoint {:?}: {}", s.endpoint, e)))?;
        let scheme = endpoint.scheme_str().unwrap_or("https");
        let authority = endpoint
            .authority()
            .ok_or_else(|| Error::Signing(format!("endpoint {:?} has no host", s.endpoint)))?
            .as_str();

        let (host, path) = if s.path_style {
            (
                authority.to_string(),
                format!("/{}/{}", uri_encode(&s.bucket, false), uri_encode(key, false)),
            )
        } else {
            (
                format!("{}.{}", s.bucket, authority),
                format!("/{}", uri_encode(key, false)),
            )
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let datestamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", datestamp, s.region);
        let credential = format!("{}/{}", s.access_key_id, scope);

        // already in canonical (byte-sorted) order
        let query = [
            ("X-Amz-Algorithm", ALGORITHM.to_string()),
            ("X-Amz-Credential", uri_encode(&credential, true)),
            ("X-Amz-Date", amz_date.clone()),
            ("X-Amz-Expires", expires.to_string()),
            ("X-Amz-SignedHeaders", "host".to_string()),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

        let canonical_request =
            format!("{method}\n{path}\n{query}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD");
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac(format!("AWS4{}", s.secret_access_key).as_bytes(), &datestamp)?;
        let k_region = hmac(&k_date, &s.region)?;
        let k_service = hmac(&k_region, "s3")?;
        let k_signing = hmac(&k_service, "aws4_request")?;
        let signature = hex::encode(hmac(&k_signing, &string_to_sign)?);

        Ok(format!(
            "{scheme}://{host}{path}?{query}&X-Amz-Signature={signature}"
        ))
    }
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| Error::Signing(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 percent-encoding as SigV4 expects it.
fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
