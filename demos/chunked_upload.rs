use std::fs::File;
use std::io::Read;

use s3_sigv4_core::{Credentials, S3};

// Replace the endpoint, bucket and file below with your own before running.
const REGION: &str = "us-east-1";
const ENDPOINT: &str = "http://127.0.0.1:9000";
const BUCKET: &str = "examplebucket";
const FILE: &str = "Cargo.toml";

fn main() -> s3_sigv4_core::Result<()> {
    let s3 = S3::new(ENDPOINT, REGION, Credentials::from_env()?)?;

    let file = File::open(FILE)?;
    let length = file.metadata()?.len();
    let (request, mut body) = s3.put_object_stream(BUCKET, FILE, file, length)?;

    // Buffer the signed frames, then hand them to any HTTP client
    let mut encoded = Vec::new();
    body.read_to_end(&mut encoded)?;
    println!(
        "PUT {} with {} encoded bytes in {} chunks",
        request.url(),
        encoded.len(),
        body.chunks_signed()
    );

    let client = reqwest::blocking::Client::new();
    let res = client
        .put(request.url().clone())
        .headers(request.headers().clone())
        .body(encoded)
        .send()?;
    println!("status {}", res.status());

    Ok(())
}
