#[macro_use]
extern crate serde;

pub mod constant;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod s3;
pub mod s3_chunked;
pub mod s3_document;
pub mod s3_error_detector;
pub mod s3_listing;
pub mod s3_paginator;
pub mod s3_post_policy;
pub mod s3_signer;
pub mod s3_string_to_sign;
pub mod transport;

pub use constant::*;
pub use credentials::*;
pub use crypto::*;
pub use error::{Error, ErrorResponse, Result};
pub use s3::*;
pub use s3_chunked::*;
pub use s3_document::*;
pub use s3_error_detector::*;
pub use s3_listing::*;
pub use s3_paginator::*;
pub use s3_post_policy::*;
pub use s3_signer::*;
pub use s3_string_to_sign::*;
pub use transport::*;
