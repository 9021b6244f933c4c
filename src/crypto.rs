use std::cell::RefCell;
use std::fmt;
use std::ops::DerefMut;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::Result;

pub type HmacSha256 = Hmac<Sha256>;

/// Reusable SHA-256 state plus the last keyed HMAC, so a run of chunks signed
/// with one key does not re-key the MAC each time.
pub struct CryptoHandle {
    digest: Sha256,
    keyed_mac: Option<(Vec<u8>, HmacSha256)>,
}

impl CryptoHandle {
    #[inline]
    pub fn new() -> Self {
        Self {
            digest: Sha256::new(),
            keyed_mac: None,
        }
    }

    pub fn sha256(&mut self, data: &[u8]) -> [u8; 32] {
        self.digest.update(data);
        let out = self.digest.finalize_reset();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&out);
        hash
    }

    #[inline]
    pub fn sha256_hex(&mut self, data: &[u8]) -> String {
        hex::encode(self.sha256(data))
    }

    /// HMAC-SHA256 under a signing key that is reused across calls.
    pub fn keyed_hmac_sha256(&mut self, key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
        let mac = match &self.keyed_mac {
            Some((cached_key, mac)) if cached_key.as_slice() == key => mac.clone(),
            _ => {
                let mac = HmacSha256::new_from_slice(key)?;
                self.keyed_mac = Some((key.to_vec(), mac.clone()));
                mac
            }
        };
        Ok(finish(mac, data))
    }
}

impl Default for CryptoHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CryptoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoHandle")
            .field("keyed", &self.keyed_mac.is_some())
            .finish()
    }
}

/// One-shot HMAC-SHA256; nothing is cached.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mac = HmacSha256::new_from_slice(key)?;
    Ok(finish(mac, data))
}

fn finish(mut mac: HmacSha256, data: &[u8]) -> [u8; 32] {
    mac.update(data);
    let out = mac.finalize().into_bytes();
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&out);
    tag
}

type Handles = DashMap<ThreadId, CryptoHandle>;

thread_local! {
    static LEASES: RefCell<Vec<Lease>> = RefCell::new(Vec::new());
}

/// Removes one thread's handle from one pool when the thread exits.
struct Lease {
    handles: Weak<Handles>,
    thread: ThreadId,
}

impl Lease {
    fn is_for(&self, handles: &Arc<Handles>) -> bool {
        Weak::ptr_eq(&self.handles, &Arc::downgrade(handles))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(handles) = self.handles.upgrade() {
            handles.remove(&self.thread);
        }
    }
}

/// Per-thread handle cache.
///
/// A handle lives until its thread calls [`release`](Self::release) or exits.
/// The guard returned by [`acquire`](Self::acquire) must be dropped before the
/// same thread calls `acquire` or `release` again.
#[derive(Default)]
pub struct CryptoPool {
    handles: Arc<Handles>,
}

impl CryptoPool {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> impl DerefMut<Target = CryptoHandle> + '_ {
        let thread = thread::current().id();
        if !self.handles.contains_key(&thread) {
            let lease = Lease {
                handles: Arc::downgrade(&self.handles),
                thread,
            };
            // Fails only while the thread is tearing down its locals.
            let _ = LEASES.try_with(|leases| leases.borrow_mut().push(lease));
        }
        self.handles.entry(thread).or_insert_with(CryptoHandle::new)
    }

    /// Drop the calling thread's handle. Returns whether one existed.
    pub fn release(&self) -> bool {
        let released = self.handles.remove(&thread::current().id()).is_some();
        let _ = LEASES.try_with(|leases| {
            leases
                .borrow_mut()
                .retain(|lease| lease.handles.strong_count() > 0 && !lease.is_for(&self.handles))
        });
        released
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl fmt::Debug for CryptoPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoPool")
            .field("handles", &self.handles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::constant::EMPTY_PAYLOAD_SHA256;

    #[test]
    fn test_should_reset_digest_between_calls() {
        let mut handle = CryptoHandle::new();
        assert_eq!(handle.sha256_hex(b""), EMPTY_PAYLOAD_SHA256);
        let first = handle.sha256_hex(b"abc");
        let second = handle.sha256_hex(b"abc");
        assert_eq!(first, second);
        assert_eq!(
            first,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_should_match_one_shot_hmac_with_cached_key() {
        let mut handle = CryptoHandle::new();
        let one_shot = hmac_sha256(b"key", b"data").unwrap();
        let cached = handle.keyed_hmac_sha256(b"key", b"data").unwrap();
        let cached_again = handle.keyed_hmac_sha256(b"key", b"data").unwrap();
        assert_eq!(one_shot, cached);
        assert_eq!(cached, cached_again);

        let other_key = handle.keyed_hmac_sha256(b"other", b"data").unwrap();
        assert_ne!(other_key, cached);
    }

    #[test]
    fn test_should_keep_one_handle_per_thread() {
        let pool = Arc::new(CryptoPool::new());
        {
            let mut handle = pool.acquire();
            handle.sha256(b"x");
        }
        assert_eq!(pool.len(), 1);

        let worker_pool = pool.clone();
        std::thread::spawn(move || {
            {
                let mut handle = worker_pool.acquire();
                handle.sha256(b"y");
            }
            assert_eq!(worker_pool.len(), 2);
            assert!(worker_pool.release());
        })
        .join()
        .unwrap();

        assert_eq!(pool.len(), 1);
        assert!(pool.release());
        assert!(!pool.release());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_should_drop_handles_of_exited_threads() {
        let pool = Arc::new(CryptoPool::new());
        let workers: Vec<_> = (0..50)
            .map(|i| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    let mut handle = pool.acquire();
                    handle.keyed_hmac_sha256(b"signing-key", &[i as u8]).unwrap();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(pool.is_empty());
    }

    #[test]
    fn test_should_reacquire_after_release_on_same_thread() {
        let pool = CryptoPool::new();
        for _ in 0..3 {
            pool.acquire().sha256(b"x");
            assert_eq!(pool.len(), 1);
            assert!(pool.release());
        }
        assert!(pool.is_empty());
        LEASES.with(|leases| {
            assert!(!leases.borrow().iter().any(|lease| lease.is_for(&pool.handles)));
        });
    }
}
