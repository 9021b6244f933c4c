use std::cmp;
use std::io::{self, Read};
use std::sync::Arc;

use tracing::trace;

use crate::constant::{CHUNK_SIGNATURE_EXT, CHUNK_SIZE, EMPTY_PAYLOAD_SHA256, S3_CHUNK_ALGO_VALUE};
use crate::crypto::{CryptoHandle, CryptoPool};
use crate::error::Result;

/// Signature chain of one streaming upload.
#[derive(Clone)]
pub struct ChunkState {
    signing_key: Vec<u8>,
    timestamp: String,
    scope: String,
    previous_signature: String,
}

impl ChunkState {
    #[inline]
    pub fn new(
        signing_key: Vec<u8>,
        timestamp: impl Into<String>,
        scope: impl Into<String>,
        seed_signature: impl Into<String>,
    ) -> Self {
        Self {
            signing_key,
            timestamp: timestamp.into(),
            scope: scope.into(),
            previous_signature: seed_signature.into(),
        }
    }

    #[inline]
    pub fn previous_signature(&self) -> &str {
        &self.previous_signature
    }

    /// Sign the next chunk and advance the chain.
    pub fn sign_chunk(&mut self, handle: &mut CryptoHandle, payload: &[u8]) -> Result<String> {
        let payload_hash = handle.sha256_hex(payload);
        let string_to_sign = chunk_string_to_sign(
            &self.timestamp,
            &self.scope,
            &self.previous_signature,
            &payload_hash,
        );
        let signature =
            hex::encode(handle.keyed_hmac_sha256(&self.signing_key, string_to_sign.as_bytes())?);
        self.previous_signature = signature.clone();
        Ok(signature)
    }

    /// Sign the next chunk and return its wire frame.
    pub fn frame(&mut self, handle: &mut CryptoHandle, payload: &[u8]) -> Result<Vec<u8>> {
        let signature = self.sign_chunk(handle, payload)?;
        let header = format!("{:x}{}{}\r\n", payload.len(), CHUNK_SIGNATURE_EXT, signature);

        let mut frame = Vec::with_capacity(header.len() + payload.len() + 2);
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\r\n");
        Ok(frame)
    }
}

impl std::fmt::Debug for ChunkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkState")
            .field("timestamp", &self.timestamp)
            .field("scope", &self.scope)
            .field("previous_signature", &self.previous_signature)
            .finish()
    }
}

pub fn chunk_string_to_sign(
    timestamp: &str,
    scope: &str,
    previous_signature: &str,
    payload_hash: &str,
) -> String {
    format!(
        "{algo}\n{timestamp}\n{scope}\n{previous}\n{empty}\n{payload}",
        algo = S3_CHUNK_ALGO_VALUE,
        timestamp = timestamp,
        scope = scope,
        previous = previous_signature,
        empty = EMPTY_PAYLOAD_SHA256,
        payload = payload_hash,
    )
}

/// Encoded body length for a payload of `decoded_len` bytes.
pub fn chunked_content_length(decoded_len: u64) -> u64 {
    let chunk_size = CHUNK_SIZE as u64;
    let full_chunks = decoded_len / chunk_size;
    let remainder = decoded_len % chunk_size;

    let mut total = full_chunks * frame_length(chunk_size);
    if remainder > 0 {
        total += frame_length(remainder);
    }
    total + frame_length(0)
}

fn frame_length(payload_len: u64) -> u64 {
    let hex_len = format!("{:x}", payload_len).len() as u64;
    hex_len + CHUNK_SIGNATURE_EXT.len() as u64 + 64 + 2 + payload_len + 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Streaming,
    Finished,
    Failed,
}

/// Reader over the signed `aws-chunked` encoding of `source`. A failed read
/// from `source` aborts the stream for good.
pub struct ChunkedSigner<R> {
    source: R,
    state: ChunkState,
    pool: Arc<CryptoPool>,
    chunk: Vec<u8>,
    frame: Vec<u8>,
    offset: usize,
    status: Status,
    chunks: u64,
}

impl<R: Read> ChunkedSigner<R> {
    pub fn new(source: R, state: ChunkState, pool: Arc<CryptoPool>) -> Self {
        Self {
            source,
            state,
            pool,
            chunk: vec![0; CHUNK_SIZE],
            frame: Vec::new(),
            offset: 0,
            status: Status::Streaming,
            chunks: 0,
        }
    }

    #[inline]
    pub fn previous_signature(&self) -> &str {
        self.state.previous_signature()
    }

    /// Number of frames signed so far, the terminal frame included.
    #[inline]
    pub fn chunks_signed(&self) -> u64 {
        self.chunks
    }

    fn finish(&mut self, status: Status) {
        self.status = status;
        self.pool.release();
    }

    fn fill_chunk(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.chunk.len() {
            match self.source.read(&mut self.chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn next_frame(&mut self) -> io::Result<()> {
        let filled = match self.fill_chunk() {
            Ok(filled) => filled,
            Err(e) => {
                self.finish(Status::Failed);
                return Err(e);
            }
        };

        let frame = {
            let mut handle = self.pool.acquire();
            self.state.frame(&mut handle, &self.chunk[..filled])
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                self.finish(Status::Failed);
                return Err(io::Error::new(io::ErrorKind::Other, e));
            }
        };

        self.chunks += 1;
        trace!(
            chunk = self.chunks,
            len = filled,
            signature = %self.state.previous_signature(),
            "signed chunk"
        );

        if filled == 0 {
            self.finish(Status::Finished);
        }
        self.frame = frame;
        self.offset = 0;
        Ok(())
    }
}

impl<R: Read> Read for ChunkedSigner<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.offset == self.frame.len() {
            match self.status {
                Status::Finished => return Ok(0),
                Status::Failed => {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        "chunked upload aborted by an earlier failure",
                    ))
                }
                Status::Streaming => self.next_frame()?,
            }
        }

        let n = cmp::min(buf.len(), self.frame.len() - self.offset);
        buf[..n].copy_from_slice(&self.frame[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

impl<R> std::fmt::Debug for ChunkedSigner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedSigner")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("chunks", &self.chunks)
            .finish()
    }
}
