//! Content-addressed on-disk tier: one file per cache entry, atomic
//! `tmp -> rename` writes (spec §4.4, §5).

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::error::Error;

const HEADER_LEN: usize = 16;

pub struct DiskTier {
    root: PathBuf,
}

impl DiskTier {
    pub fn new(root: PathBuf) -> Result<Self, Error> {
        fs::create_dir_all(&root).map_err(|e| Error::decode("create disk cache root", e))?;
        Ok(Self { root })
    }

    fn path_for(&self, source: &str, key: &str) -> PathBuf {
        let hash = fnv1a_hash(source, key);
        self.root.join(format!("{hash:016x}.cache"))
    }

    /// Returns the cached bytes and the entry's own stored TTL (the caller
    /// promotes this into the memory tier, refreshing the same TTL there).
    pub fn get(&self, source: &str, key: &str, ttl_override: Option<Duration>) -> Option<(Bytes, Duration)> {
        let path = self.path_for(source, key);
        let raw = fs::read(&path).ok()?;
        if raw.len() < HEADER_LEN {
            return None;
        }

        let inserted_secs = u64::from_le_bytes(raw[0..8].try_into().ok()?);
        let ttl_secs = u64::from_le_bytes(raw[8..16].try_into().ok()?);
        let stored_ttl = Duration::from_secs(ttl_secs);
        let effective_ttl = ttl_override.unwrap_or(stored_ttl);

        let inserted_at = UNIX_EPOCH + Duration::from_secs(inserted_secs);
        let age = SystemTime::now().duration_since(inserted_at).ok()?;
        if age > effective_ttl {
            let _ = fs::remove_file(&path);
            return None;
        }

        Some((Bytes::copy_from_slice(&raw[HEADER_LEN..]), stored_ttl))
    }

    pub fn set(&self, source: &str, key: &str, bytes: &[u8], ttl: Duration) -> Result<(), Error> {
        let path = self.path_for(source, key);
        let tmp_path = path.with_extension("tmp");

        let inserted_secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| Error::decode("write disk cache entry", e))?;
            file.write_all(&inserted_secs.to_le_bytes()).map_err(|e| Error::decode("write disk cache entry", e))?;
            file.write_all(&ttl.as_secs().to_le_bytes()).map_err(|e| Error::decode("write disk cache entry", e))?;
            file.write_all(bytes).map_err(|e| Error::decode("write disk cache entry", e))?;
        }

        fs::rename(&tmp_path, &path).map_err(|e| Error::decode("install disk cache entry", e))?;
        Ok(())
    }

    pub fn remove(&self, source: &str, key: &str) {
        let _ = fs::remove_file(self.path_for(source, key));
    }
}

/// FNV-1a over `source\0key`. Deterministic across runs, unlike
/// `DefaultHasher` (which is SipHash with a per-process random seed) — the
/// whole point of content addressing is that the same key maps to the same
/// file on the next run.
fn fnv1a_hash(source: &str, key: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in source.bytes().chain(std::iter::once(0)).chain(key.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
