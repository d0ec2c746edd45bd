// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SharedMemory - named segment facade.
//!
//! A positive size creates the segment, zero attaches to an existing one.
//! Construction never fails loudly: check [`SharedMemory::valid`] and, for
//! the reason, [`SharedMemory::error`].

use std::marker::PhantomData;

use crate::config::SegmentConfig;
use crate::error::SharedMemoryError;
use crate::shm::backend::{PlatformBackend, SegmentBackend};
use crate::types::{BackendFlavor, LockStatus, Role, SegmentName};

/// A named shared-memory segment guarded by a cross-process mutex and
/// condition variable.
///
/// The payload is not synchronized by this type: hold the lock (see
/// [`SharedMemory::guard`]) while touching [`SharedMemory::data`].
///
/// ```no_run
/// use shmlink_core::SharedMemory;
///
/// let writer = SharedMemory::open("/demo", 16);
/// assert!(writer.valid());
/// if let Some(mut guard) = writer.guard() {
///     guard.as_mut_slice()[..10].copy_from_slice(b"HELLOWORLD");
/// }
/// writer.notify_all();
/// ```
pub struct SharedMemory {
    /// Normalized name, or the raw input if it could not be normalized.
    name: String,
    /// Requested size; replaced by the segment's size once opened.
    size: u32,
    role: Role,
    flavor: BackendFlavor,
    backend: Option<PlatformBackend>,
    error: Option<SharedMemoryError>,
}

impl SharedMemory {
    /// Create (`size > 0`) or attach to (`size == 0`) the segment `name`,
    /// with the backend flavor taken from the environment.
    ///
    /// Creating under a name that already exists on Unix removes the
    /// existing object first, even if another creator is still using it.
    /// That creator keeps its mapping but no longer owns the name, and its
    /// drop then unlinks the name of the newer segment. Give every live
    /// segment its own name.
    pub fn open(name: &str, size: u32) -> Self {
        Self::open_with(name, size, &SegmentConfig::from_env())
    }

    /// Like [`SharedMemory::open`] with an explicit configuration.
    pub fn open_with(name: &str, size: u32, config: &SegmentConfig) -> Self {
        let role = Role::for_size(size);
        match Self::connect(name, size, config) {
            Ok((segment_name, backend)) => Self {
                name: segment_name.to_string(),
                size: backend.size(),
                role,
                flavor: config.flavor,
                backend: Some(backend),
                error: None,
            },
            Err(e) => {
                tracing::error!(
                    name = %e.name(),
                    role = %role,
                    backend = config.flavor.label(),
                    error = %e,
                    "Shared memory unavailable"
                );
                Self {
                    name: e.name().to_string(),
                    size,
                    role,
                    flavor: config.flavor,
                    backend: None,
                    error: Some(e),
                }
            }
        }
    }

    /// Like [`SharedMemory::open_with`], returning the failure instead of an
    /// invalid segment.
    pub fn try_open(
        name: &str,
        size: u32,
        config: &SegmentConfig,
    ) -> Result<Self, SharedMemoryError> {
        let (segment_name, backend) = Self::connect(name, size, config)?;
        Ok(Self {
            name: segment_name.to_string(),
            size: backend.size(),
            role: Role::for_size(size),
            flavor: config.flavor,
            backend: Some(backend),
            error: None,
        })
    }

    fn connect(
        name: &str,
        size: u32,
        config: &SegmentConfig,
    ) -> Result<(SegmentName, PlatformBackend), SharedMemoryError> {
        let segment_name = SegmentName::new(name)?;
        config
            .validate()
            .map_err(|source| SharedMemoryError::InvalidConfig {
                name: segment_name.to_string(),
                source,
            })?;
        let backend = match Role::for_size(size) {
            Role::Creator => PlatformBackend::create(&segment_name, size, config)?,
            Role::Attacher => PlatformBackend::attach(&segment_name, config)?,
        };
        Ok((segment_name, backend))
    }

    /// Block until the segment lock is held. No timeout.
    pub fn lock(&self) -> LockStatus {
        self.backend
            .as_ref()
            .map_or(LockStatus::Unavailable, |b| b.lock())
    }

    /// Release the segment lock. No-op on an invalid segment.
    pub fn unlock(&self) {
        if let Some(backend) = &self.backend {
            backend.unlock();
        }
    }

    /// Park until another facade calls [`SharedMemory::notify_all`].
    ///
    /// Takes the lock, releases it while parked, re-takes it on wake-up and
    /// releases it again before returning; the caller must not hold the
    /// lock. Spurious wake-ups are possible and a notify issued before this
    /// call is not remembered. To check a predicate under the lock use
    /// [`SegmentGuard::wait`].
    pub fn wait(&self) {
        if let Some(backend) = &self.backend {
            backend.wait();
        }
    }

    /// Wake every waiter on this segment. Never blocks.
    pub fn notify_all(&self) {
        if let Some(backend) = &self.backend {
            backend.notify_all();
        }
    }

    /// Lock the segment for the lifetime of the returned guard.
    ///
    /// `None` when the lock could not be taken.
    pub fn guard(&self) -> Option<SegmentGuard<'_>> {
        let status = self.lock();
        if !status.is_held() {
            return None;
        }
        Some(SegmentGuard {
            segment: self,
            status,
            _not_send: PhantomData,
        })
    }

    /// Whether the segment is open, mapped and non-empty.
    pub fn valid(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_valid())
    }

    /// First payload byte. Null on an invalid segment; call `valid()` first.
    pub fn data(&self) -> *mut u8 {
        self.backend
            .as_ref()
            .map_or(std::ptr::null_mut(), |b| b.user_ptr())
    }

    /// Payload size. On an invalid segment, the size that was requested.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn flavor(&self) -> BackendFlavor {
        self.flavor
    }

    /// Why the segment is invalid, if it is.
    pub fn error(&self) -> Option<&SharedMemoryError> {
        self.error.as_ref()
    }

    /// Get a slice view of the payload. Empty on an invalid segment.
    ///
    /// # Safety
    /// Caller must hold the lock or otherwise ensure no concurrent writes.
    pub unsafe fn as_slice(&self) -> &[u8] {
        if !self.valid() {
            return &[];
        }
        std::slice::from_raw_parts(self.data(), self.size as usize)
    }

    /// Get a mutable slice view of the payload. Empty on an invalid segment.
    ///
    /// # Safety
    /// Caller must hold the lock or otherwise ensure exclusive access.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        if !self.valid() {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(self.data(), self.size as usize)
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("role", &self.role)
            .field("flavor", &self.flavor)
            .field("valid", &self.valid())
            .field("error", &self.error)
            .finish()
    }
}

/// Holds the segment lock; unlocks on drop.
///
/// Not `Send`: the lock must be released by the thread that took it.
pub struct SegmentGuard<'a> {
    segment: &'a SharedMemory,
    status: LockStatus,
    _not_send: PhantomData<*const ()>,
}

impl SegmentGuard<'_> {
    /// How the lock was (last) acquired.
    pub fn status(&self) -> LockStatus {
        self.status
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the lock is held and the segment is valid while a guard
        // exists.
        unsafe {
            std::slice::from_raw_parts(self.segment.data(), self.segment.size() as usize)
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; &mut self prevents aliasing through this guard.
        unsafe {
            std::slice::from_raw_parts_mut(self.segment.data(), self.segment.size() as usize)
        }
    }

    /// Release the lock while parked, re-acquire before returning.
    ///
    /// Re-check the wait predicate after return.
    pub fn wait(&mut self) -> LockStatus {
        if let Some(backend) = &self.segment.backend {
            self.status = backend.wait_locked();
        }
        self.status
    }
}

impl Drop for SegmentGuard<'_> {
    fn drop(&mut self) {
        self.segment.unlock();
    }
}
