use std::env;
use std::fmt;

use crate::error::{Error, Result};

pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";

/// Access key pair used to sign requests.
///
/// The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    #[inline]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Load from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    pub fn from_env() -> Result<Self> {
        let access_key = read_env(ACCESS_KEY_ENV)?;
        let secret_key = read_env(SECRET_KEY_ENV)?;
        Ok(Self::new(access_key, secret_key))
    }

    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    #[inline]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

fn read_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Config(format!("environment variable {} is not set", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_redact_secret_in_debug() {
        let creds = Credentials::new("AKIDEXAMPLE", "super-secret");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_should_fail_on_missing_env() {
        let err = read_env("S3_SIGV4_CORE_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
