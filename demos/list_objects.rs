use std::sync::Arc;

use s3_sigv4_core::{Credentials, ReqwestTransport, Result, S3};

// Reads AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY. Replace the endpoint and
// bucket below with your own before running.
const REGION: &str = "us-east-1";
const ENDPOINT: &str = "https://s3.amazonaws.com";
const BUCKET: &str = "examplebucket";

fn main() -> Result<()> {
    let s3 = S3::new(ENDPOINT, REGION, Credentials::from_env()?)?;
    // The blocking client must be created and dropped outside the runtime.
    let transport = Arc::new(ReqwestTransport::new(reqwest::blocking::Client::new()));

    // Blocking walk over every bucket
    for bucket in s3.list_buckets(transport.clone()) {
        println!("bucket {}", bucket?.name);
    }

    // Future-returning walk over one bucket
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let mut objects = s3
        .list_objects(transport.clone(), BUCKET, Some("logs/"))
        .into_async();
    runtime.block_on(async move {
        while objects.has_next() {
            if let Some(object) = objects.next_future().await? {
                println!("{} {} bytes", object.key, object.size);
            }
        }
        Ok::<_, s3_sigv4_core::Error>(())
    })?;

    drop(runtime);
    drop(transport);
    Ok(())
}
