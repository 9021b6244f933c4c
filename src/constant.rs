pub const S3_ALGO_KEY: &str = "X-Amz-Algorithm";
pub const S3_CRED_KEY: &str = "X-Amz-Credential";
pub const S3_DATE_KEY: &str = "X-Amz-Date";
pub const S3_SIGNATURE_KEY: &str = "X-Amz-Signature";
pub const S3_EXPIRES_KEY: &str = "X-Amz-Expires";
pub const S3_SIGNED_HEADERS_KEY: &str = "X-Amz-SignedHeaders";
pub const S3_ALGO_VALUE: &str = "AWS4-HMAC-SHA256";
pub const S3_CHUNK_ALGO_VALUE: &str = "AWS4-HMAC-SHA256-PAYLOAD";

pub const HOST_HEADER: &str = "host";
pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";
pub const DATE_HEADER: &str = "x-amz-date";

/// Headers covered by a header-signed request, in canonical order.
pub const SIGNED_HEADERS: [&str; 3] = [HOST_HEADER, CONTENT_SHA256_HEADER, DATE_HEADER];

pub const SERVICE_NAME: &str = "s3";
pub const SCOPE_TERMINATOR: &str = "aws4_request";

pub const STREAMING_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
/// SHA-256 of the empty string.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub const CHUNK_SIZE: usize = 16 * 1024;
pub const CHUNK_SIGNATURE_EXT: &str = ";chunk-signature=";

pub const CONTINUATION_TOKEN_PARAM: &str = "continuation-token";

pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

/// Presigned URLs may live at most seven days.
pub const MAX_PRESIGN_EXPIRES: u64 = 604_800;
