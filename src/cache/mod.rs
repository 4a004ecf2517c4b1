//! Two-tier (memory + disk) cache with per-request policy overrides (spec
//! §4.4), generalizing the teacher's memory/SQLite `HybridCache` split into
//! a memory/disk split with content addressing and validator-guarded
//! writes.

pub mod disk;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::CacheConfig;
use crate::error::Error;
use crate::observability::Clock;

use disk::DiskTier;
use memory::MemoryTier;

/// Where a [`MultiTierCache::get`] call was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    Memory,
    Disk,
    Miss,
}

/// Caller-supplied policy for one cache operation. The zero value behaves
/// as documented defaults: reads and writes enabled, TTL governed by
/// whatever the call site passes as its "default" TTL.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheContext {
    pub no_cache: bool,
    pub direct_download: bool,
    pub max_age: Duration,
}

impl CacheContext {
    pub fn read_enabled(&self) -> bool {
        !self.no_cache
    }

    pub fn write_enabled(&self) -> bool {
        !self.no_cache && !self.direct_download
    }

    /// `None` means "use the entry's own stored TTL"; `Some` means the
    /// caller's `max_age` overrides it for this read.
    fn ttl_override(&self) -> Option<Duration> {
        if self.max_age.is_zero() {
            None
        } else {
            Some(self.max_age)
        }
    }
}

/// Validates a buffer before it's written through to both tiers. Returning
/// `Err` aborts the write entirely.
pub type Validator<'a> = dyn Fn(&[u8]) -> Result<(), Error> + 'a;

/// Verifies the first two bytes are the ZIP local-file signature (spec
/// §4.4's package-binary validator), then conceptually "rewinds" — there's
/// nothing to rewind here since the buffer is already fully in memory.
pub fn zip_signature_validator(bytes: &[u8]) -> Result<(), Error> {
    if bytes.len() < 2 || bytes[0] != 0x50 || bytes[1] != 0x4B {
        return Err(Error::ValidationFailed {
            context: "validate package binary",
            message: "missing ZIP local-file signature".to_string(),
        });
    }
    Ok(())
}

pub struct MultiTierCache {
    memory: MemoryTier,
    disk: DiskTier,
}

impl MultiTierCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        Ok(Self {
            memory: MemoryTier::new(config.memory_budget_bytes, clock),
            disk: DiskTier::new(config.resolved_root_dir())?,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_root(config: &CacheConfig, clock: Arc<dyn Clock>, root: std::path::PathBuf) -> Result<Self, Error> {
        Ok(Self { memory: MemoryTier::new(config.memory_budget_bytes, clock), disk: DiskTier::new(root)? })
    }

    /// Checks memory first; on a miss, checks disk and promotes a disk hit
    /// into memory so the next read skips disk I/O entirely.
    pub fn get(&self, source: &str, key: &str, ctx: &CacheContext) -> (Option<Bytes>, Hit) {
        if !ctx.read_enabled() {
            return (None, Hit::Miss);
        }

        let ttl_override = ctx.ttl_override();

        if let Some(bytes) = self.memory.get(source, key, ttl_override) {
            return (Some(bytes), Hit::Memory);
        }

        if let Some((bytes, stored_ttl)) = self.disk.get(source, key, ttl_override) {
            self.memory.set(source, key, bytes.clone(), stored_ttl);
            return (Some(bytes), Hit::Disk);
        }

        (None, Hit::Miss)
    }

    /// Reads `bytes` fully (the caller already has them buffered), runs the
    /// validator if given, and installs into both tiers atomically.
    /// `direct_download`/`no_cache` suppress the write entirely.
    pub fn set(
        &self,
        source: &str,
        key: &str,
        bytes: Bytes,
        ttl: Duration,
        ctx: &CacheContext,
        validator: Option<&Validator<'_>>,
    ) -> Result<(), Error> {
        if !ctx.write_enabled() {
            return Ok(());
        }

        if let Some(validate) = validator {
            validate(&bytes)?;
        }

        self.memory.set(source, key, bytes.clone(), ttl);
        self.disk.set(source, key, &bytes, ttl)?;
        Ok(())
    }

    pub fn invalidate(&self, source: &str, key: &str) {
        self.memory.remove(source, key);
        self.disk.remove(source, key);
    }
}

/// Reserved cache-key formats (spec §4.4).
pub mod keys {
    pub const SERVICE_INDEX: &str = "service_index";

    pub fn metadata(package_id: &str, version: &str) -> String {
        format!("metadata:{package_id}:{version}")
    }

    pub fn versions(package_id: &str) -> String {
        format!("versions:{package_id}")
    }

    pub fn search(query: &str, skip: u32, take: u32, prerelease: bool) -> String {
        format!("search:{query}:{skip}:{take}:{prerelease}")
    }

    pub fn package_binary(package_id: &str, version: &str) -> String {
        format!("package:{package_id}.{version}.nupkg")
    }

    pub fn v3_registration_list(package_id_lower: &str) -> String {
        format!("list_{package_id_lower}")
    }

    pub fn v3_registration_page(package_id_lower: &str, lower: &str, upper: &str) -> String {
        format!("list_{package_id_lower}_range_{lower}-{upper}")
    }
}
