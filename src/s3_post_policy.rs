use std::collections::BTreeMap;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Browser-form upload conditions. Field matches are emitted in key order.
#[derive(Debug, Clone, Serialize)]
pub struct Conditions(Vec<Value>);

impl Conditions {
    pub fn new(
        content_length_range: (u64, u64),
        bucket: &str,
        fields: &BTreeMap<String, String>,
    ) -> Self {
        let mut conditions = Self(vec![]);

        conditions.insert_range_number(
            "content-length-range",
            content_length_range.0,
            content_length_range.1,
        );
        conditions.insert_match("bucket", bucket);
        for (key, value) in fields.iter() {
            conditions.insert_match(key.as_str(), value.as_str());
        }

        conditions
    }

    pub fn insert_match(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let mut exact = serde_json::Map::new();
        exact.insert(key.into(), Value::String(value.into()));
        self.0.push(Value::Object(exact));
    }

    pub fn insert_starts_with(&mut self, key: &str, prefix: &str) {
        self.0.push(json!(["starts-with", format!("${}", key), prefix]));
    }

    pub fn insert_range_number(&mut self, key: &str, from: u64, to: u64) {
        self.0.push(json!([key, from, to]));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Policy {
    expiration: String,
    conditions: Conditions,
}

impl Policy {
    pub fn new(expiration: DateTime<Utc>, conditions: Conditions) -> Self {
        let expiration = expiration.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            expiration,
            conditions,
        }
    }

    pub fn init(
        now: DateTime<Utc>,
        expire_on: Duration,
        bucket: &str,
        content_length_range: (u64, u64),
        fields: &BTreeMap<String, String>,
    ) -> Self {
        let conditions = Conditions::new(content_length_range, bucket, fields);
        Self::new(now + expire_on, conditions)
    }

    #[inline]
    pub fn expiration(&self) -> &str {
        &self.expiration
    }

    /// Base64 of the JSON document. This is also the string that gets signed.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_string(self)
            .map_err(|e| Error::Config(format!("unable to serialize post policy: {}", e)))?;
        Ok(base64::encode(json))
    }
}
