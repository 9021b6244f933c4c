use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderValue;
use reqwest::{Method, Request, Url};
use tracing::debug;

use crate::constant::*;
use crate::credentials::Credentials;
use crate::crypto::{hmac_sha256, CryptoPool};
use crate::error::{Error, Result};
use crate::s3_chunked::{ChunkState, ChunkedSigner};
use crate::s3_string_to_sign::{amz_date, append_query, scope, string_to_sign, CanonicalRequest};

/// Intermediate values of one request signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub canonical_request: String,
    pub string_to_sign: String,
    pub signature: String,
    pub authorization: String,
}

/// SigV4 signer for one access key in one region.
///
/// Cloning is cheap; clones share the per-thread [`CryptoPool`].
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
    region: String,
    pool: Arc<CryptoPool>,
}

impl Signer {
    #[inline]
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self::with_pool(credentials, region, Arc::new(CryptoPool::new()))
    }

    #[inline]
    pub fn with_pool(
        credentials: Credentials,
        region: impl Into<String>,
        pool: Arc<CryptoPool>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            pool,
        }
    }

    #[inline]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[inline]
    pub fn access_key(&self) -> &str {
        self.credentials.access_key()
    }

    #[inline]
    pub fn pool(&self) -> &Arc<CryptoPool> {
        &self.pool
    }

    /// Drop the calling thread's cached crypto handle.
    #[inline]
    pub fn release(&self) -> bool {
        self.pool.release()
    }

    #[inline]
    pub fn signing_key(&self, date: DateTime<Utc>) -> Result<Vec<u8>> {
        derive_signing_key(
            self.credentials.secret_key(),
            &date.format(SCOPE_DATE_FORMAT).to_string(),
            &self.region,
        )
    }

    /// `<access key>/<date>/<region>/s3/aws4_request`
    #[inline]
    pub fn credential(&self, date: DateTime<Utc>) -> String {
        format!(
            "{access_key}/{scope}",
            access_key = self.credentials.access_key(),
            scope = scope(&self.region, date),
        )
    }

    /// Sign an arbitrary string with the derived key, e.g. a POST policy.
    #[inline]
    pub fn sign_string(&self, date: DateTime<Utc>, string_to_sign: &str) -> Result<String> {
        let key = self.signing_key(date)?;
        let mut handle = self.pool.acquire();
        Ok(hex::encode(handle.keyed_hmac_sha256(&key, string_to_sign.as_bytes())?))
    }

    /// Sign a header-authenticated request whose payload hash is known.
    ///
    /// Sets `host`, `x-amz-content-sha256`, `x-amz-date` and `Authorization`
    /// on the request.
    #[inline]
    pub fn sign(
        &self,
        request: &mut Request,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<RequestSignature> {
        self.sign_with_key(request, payload_hash, now)
            .map(|(signature, _)| signature)
    }

    /// Hash a fully buffered payload, then sign.
    pub fn sign_payload(
        &self,
        request: &mut Request,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<RequestSignature> {
        let payload_hash = {
            let mut handle = self.pool.acquire();
            handle.sha256_hex(payload)
        };
        self.sign(request, &payload_hash, now)
    }

    /// Sign with the streaming placeholder and wrap `source` in a chunk signer
    /// seeded with the request signature.
    pub fn sign_streaming<R: Read>(
        &self,
        request: &mut Request,
        source: R,
        now: DateTime<Utc>,
    ) -> Result<ChunkedSigner<R>> {
        let (signature, signing_key) = self.sign_with_key(request, STREAMING_PAYLOAD, now)?;
        let state = ChunkState::new(
            signing_key,
            amz_date(now),
            scope(&self.region, now),
            signature.signature,
        );
        Ok(ChunkedSigner::new(source, state, self.pool.clone()))
    }

    /// Query-string authenticated GET, valid for `expires_in` seconds.
    pub fn presign_get(
        &self,
        mut url: Url,
        expires_in: u64,
        now: DateTime<Utc>,
    ) -> Result<Request> {
        if expires_in == 0 || expires_in > MAX_PRESIGN_EXPIRES {
            return Err(Error::Config(format!(
                "presigned expiry must be between 1 and {} seconds, got {}",
                MAX_PRESIGN_EXPIRES, expires_in
            )));
        }

        let host = host_header(&url)?;
        append_query(
            &mut url,
            &[
                (S3_ALGO_KEY, S3_ALGO_VALUE),
                (S3_CRED_KEY, &self.credential(now)),
                (S3_DATE_KEY, &amz_date(now)),
                (S3_EXPIRES_KEY, &expires_in.to_string()),
                (S3_SIGNED_HEADERS_KEY, HOST_HEADER),
            ],
        );

        let mut req = Request::new(Method::GET, url);
        req.headers_mut().insert(HOST_HEADER, header_value(&host)?);

        let canonical_request = req.canonical_request(&[HOST_HEADER], UNSIGNED_PAYLOAD);
        debug!(canonical_request = %canonical_request, "built presigned canonical request");

        let signing_key = self.signing_key(now)?;
        let signature = {
            let mut handle = self.pool.acquire();
            let canonical_hash = handle.sha256_hex(canonical_request.as_bytes());
            let string_to_sign =
                string_to_sign(&amz_date(now), &scope(&self.region, now), &canonical_hash);
            hex::encode(handle.keyed_hmac_sha256(&signing_key, string_to_sign.as_bytes())?)
        };
        append_query(req.url_mut(), &[(S3_SIGNATURE_KEY, &signature)]);

        Ok(req)
    }

    fn sign_with_key(
        &self,
        request: &mut Request,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(RequestSignature, Vec<u8>)> {
        let timestamp = amz_date(now);
        let scope = scope(&self.region, now);
        let host = host_header(request.url())?;

        let headers_mut = request.headers_mut();
        headers_mut.insert(HOST_HEADER, header_value(&host)?);
        headers_mut.insert(CONTENT_SHA256_HEADER, header_value(payload_hash)?);
        headers_mut.insert(DATE_HEADER, header_value(&timestamp)?);

        let canonical_request = request.canonical_request(&SIGNED_HEADERS, payload_hash);
        debug!(
            method = %request.method(),
            canonical_request = %canonical_request,
            "built canonical request"
        );

        let signing_key = self.signing_key(now)?;
        let (string_to_sign, signature) = {
            let mut handle = self.pool.acquire();
            let canonical_hash = handle.sha256_hex(canonical_request.as_bytes());
            let string_to_sign = string_to_sign(&timestamp, &scope, &canonical_hash);
            let signature =
                hex::encode(handle.keyed_hmac_sha256(&signing_key, string_to_sign.as_bytes())?);
            (string_to_sign, signature)
        };
        debug!(string_to_sign = %string_to_sign, "built string to sign");

        let authorization = format!(
            "{algo} Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            algo = S3_ALGO_VALUE,
            access_key = self.credentials.access_key(),
            scope = scope,
            signed_headers = SIGNED_HEADERS.join(";"),
            signature = signature,
        );
        request
            .headers_mut()
            .insert(AUTHORIZATION_HEADER, header_value(&authorization)?);

        Ok((
            RequestSignature {
                canonical_request,
                string_to_sign,
                signature,
                authorization,
            },
            signing_key,
        ))
    }
}

/// Four-step HMAC chain over `date8`, region, `s3` and `aws4_request`.
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str) -> Result<Vec<u8>> {
    // Step 1: Sign Date
    let date_key = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes())?;
    // Step 2: Sign Date and Region
    let date_region_key = hmac_sha256(&date_key, region.as_bytes())?;
    // Step 3: Sign Date and region and Service
    let date_region_service_key = hmac_sha256(&date_region_key, SERVICE_NAME.as_bytes())?;
    // Step 4: Final sign
    let signing_key = hmac_sha256(&date_region_service_key, SCOPE_TERMINATOR.as_bytes())?;

    Ok(signing_key.to_vec())
}

/// Host with an explicit port when the URL carries a non-default one.
fn host_header(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Config(format!("URL has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Config(format!("invalid header value {:?}: {}", value, e)))
}
