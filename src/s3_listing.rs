use std::io;

use crate::error::{Error, Result};
use crate::s3_document::{Document, Element};

pub const LIST_BUCKETS_TOKEN: &str = "ContinuationToken";
pub const LIST_BUCKETS_LIMIT_PARAM: &str = "max-buckets";
pub const LIST_OBJECTS_TOKEN: &str = "NextContinuationToken";
pub const LIST_OBJECTS_LIMIT_PARAM: &str = "max-keys";
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub name: String,
    pub creation_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Object {
    pub key: String,
    pub last_modified: String,
    pub etag: String,
    pub size: u64,
    pub storage_class: String,
}

pub fn bucket_count(document: &Document) -> usize {
    document
        .root()
        .child("Buckets")
        .map(|buckets| buckets.children_named("Bucket").count())
        .unwrap_or(0)
}

pub fn read_bucket(document: &Document, index: usize) -> Result<Bucket> {
    let bucket = document
        .root()
        .child("Buckets")
        .and_then(|buckets| buckets.children_named("Bucket").nth(index))
        .ok_or_else(|| missing_item("Bucket", index))?;

    Ok(Bucket {
        name: text(bucket, "Name"),
        creation_date: text(bucket, "CreationDate"),
    })
}

pub fn object_count(document: &Document) -> usize {
    document.root().children_named("Contents").count()
}

pub fn read_object(document: &Document, index: usize) -> Result<Object> {
    let object = document
        .root()
        .children_named("Contents")
        .nth(index)
        .ok_or_else(|| missing_item("Contents", index))?;

    let size = match object.child_text("Size") {
        Some(size) => size.parse::<u64>().map_err(|e| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid object size {:?}: {}", size, e),
            ))
        })?,
        None => 0,
    };

    Ok(Object {
        key: text(object, "Key"),
        last_modified: text(object, "LastModified"),
        etag: text(object, "ETag"),
        size,
        storage_class: text(object, "StorageClass"),
    })
}

fn text(element: &Element, name: &str) -> String {
    element.child_text(name).unwrap_or_default().to_string()
}

fn missing_item(name: &str, index: usize) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("page has no <{}> at index {}", name, index),
    ))
}
