use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Request, Url};

use crate::constant::{
    AMZ_DATE_FORMAT, S3_ALGO_VALUE, SCOPE_DATE_FORMAT, SCOPE_TERMINATOR, SERVICE_NAME,
};

/// Everything except the SigV4 unreserved characters (`A-Z a-z 0-9 - _ . ~`).
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub trait CanonicalRequest {
    fn canonical_path(&self) -> String;
    fn canonical_query(&self) -> String;
    fn canonical_headers(&self, signed_headers: &[&str]) -> String;
    fn canonical_request(&self, signed_headers: &[&str], payload_hash: &str) -> String;
}

impl CanonicalRequest for Request {
    fn canonical_path(&self) -> String {
        match self.url().path() {
            "" => "/".to_string(),
            path => path.to_string(),
        }
    }

    fn canonical_query(&self) -> String {
        canonical_query_string(self.url().query().unwrap_or(""))
    }

    /// One `name:value\n` line per signed header, in the order given.
    fn canonical_headers(&self, signed_headers: &[&str]) -> String {
        let mut res = String::new();

        for name in signed_headers {
            let value = self
                .headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .trim();
            res.push_str(&format!(
                "{headerName}:{headerValue}\n",
                headerName = name,
                headerValue = value,
            ));
        }

        res
    }

    fn canonical_request(&self, signed_headers: &[&str], payload_hash: &str) -> String {
        let mut canonical = String::new();
        canonical.push_str(&format!("{method}\n", method = self.method().as_str()));
        canonical.push_str(&format!("{path}\n", path = self.canonical_path()));
        canonical.push_str(&format!("{query}\n", query = self.canonical_query()));
        canonical.push_str(&format!(
            "{headers}\n",
            headers = self.canonical_headers(signed_headers)
        ));
        canonical.push_str(&format!(
            "{signed_headers}\n",
            signed_headers = signed_headers.join(";")
        ));
        canonical.push_str(payload_hash);

        canonical
    }
}

/// Sort raw (already encoded) query parameters by their full `key=value` text.
///
/// A bare `key` is written as `key=`. Empty segments are dropped.
pub fn canonical_query_string(raw_query: &str) -> String {
    let mut params: Vec<String> = raw_query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            if pair.contains('=') {
                pair.to_string()
            } else {
                format!("{}=", pair)
            }
        })
        .collect();
    params.sort();
    params.join("&")
}

#[inline]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

/// Append `key=value` pairs to the URL query, encoded the way they are signed.
///
/// `url::form_urlencoded` writes spaces as `+`, which SigV4 does not accept, so
/// the query text is assembled here instead.
pub fn append_query(url: &mut Url, pairs: &[(&str, &str)]) {
    let mut query = url.query().unwrap_or("").to_string();
    for (key, value) in pairs {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&uri_encode(key));
        query.push('=');
        query.push_str(&uri_encode(value));
    }
    url.set_query(Some(&query));
}

#[inline]
pub fn scope(region: &str, date: DateTime<Utc>) -> String {
    format!(
        "{date}/{region}/{service}/{terminator}",
        date = date.format(SCOPE_DATE_FORMAT),
        region = region,
        service = SERVICE_NAME,
        terminator = SCOPE_TERMINATOR,
    )
}

#[inline]
pub fn amz_date(date: DateTime<Utc>) -> String {
    date.format(AMZ_DATE_FORMAT).to_string()
}

#[inline]
pub fn string_to_sign(timestamp: &str, scope: &str, canonical_hash: &str) -> String {
    let mut s = String::new();
    s.push_str(&format!("{}\n", S3_ALGO_VALUE));
    s.push_str(&format!("{}\n", timestamp));
    s.push_str(&format!("{}\n", scope));
    s.push_str(canonical_hash);

    s
}
