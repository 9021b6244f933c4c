use tracing::warn;

use crate::error::{Error, ErrorResponse, Result};
use crate::s3_document::Document;

pub const ERROR_ELEMENT: &str = "Error";

/// Whether the document carries an `<Error>` element, the root included.
#[inline]
pub fn is_error(document: &Document) -> bool {
    document.find(ERROR_ELEMENT).is_some()
}

/// Read the error fields; any missing one is left empty.
pub fn parse_error(document: &Document) -> ErrorResponse {
    let error = document.find(ERROR_ELEMENT).unwrap_or_else(|| document.root());
    let field = |name: &str| {
        error
            .find(name)
            .map(|e| e.text().to_string())
            .unwrap_or_default()
    };

    ErrorResponse {
        code: field("Code"),
        message: field("Message"),
        resource: field("Resource"),
        request_id: field("RequestId"),
        host_id: field("HostId"),
    }
}

/// `Err(Error::Protocol(..))` when the document is an error document.
pub fn check_error(document: &Document) -> Result<()> {
    if !is_error(document) {
        return Ok(());
    }

    let response = parse_error(document);
    warn!(
        code = %response.code,
        resource = %response.resource,
        request_id = %response.request_id,
        "storage service returned an error"
    );
    Err(Error::Protocol(response))
}
