// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Memory-mapped backend: POSIX shared memory object plus a header-embedded
//! robust mutex and condition variable.

use std::fs::File;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;

use super::SegmentBackend;
use crate::config::SegmentConfig;
use crate::error::SharedMemoryError;
use crate::shm::handle::Mapping;
use crate::shm::header::{SegmentHeader, SyncFailure, HEADER_SIZE};
use crate::types::{BackendFlavor, LockStatus, Role, SegmentName};

/// Segment realized with `shm_open` + `mmap` and pthread primitives.
pub struct MappedBackend {
    name: SegmentName,
    flavor: BackendFlavor,
    role: Role,
    size: u32,
    file: Option<File>,
    mapping: Option<Mapping>,
    /// Set once the creator initialized the header's pthread objects.
    sync_initialized: bool,
}

impl MappedBackend {
    fn header(&self) -> Option<&SegmentHeader> {
        // SAFETY: every mapping held here spans at least HEADER_SIZE bytes
        // and lives as long as &self.
        self.mapping
            .as_ref()
            .map(|m| unsafe { SegmentHeader::from_ptr(m.as_ptr()) })
    }

    fn log_sync_failure(&self, failure: SyncFailure) {
        tracing::error!(
            name = %self.name,
            backend = self.flavor.label(),
            call = failure.call,
            error = %failure.errno,
            "Synchronization call failed"
        );
    }

    /// Best-effort pin; failure is only logged.
    fn pin(&self) {
        if let Some(mapping) = &self.mapping {
            if let Err(e) = mapping.pin() {
                tracing::warn!(
                    name = %self.name,
                    backend = self.flavor.label(),
                    len = mapping.len(),
                    error = %e,
                    "Failed to lock shared memory into RAM"
                );
            }
        }
    }

    /// Exclusively create the shared memory object.
    ///
    /// A leftover object from an unclean shutdown is removed once and the
    /// creation retried once.
    fn open_exclusive(
        name: &SegmentName,
        config: &SegmentConfig,
    ) -> Result<File, SharedMemoryError> {
        let flags = OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR;
        let mode = Mode::from_bits_truncate(config.mode as libc::mode_t);

        let first = match shm_open(name.as_str(), flags, mode) {
            Ok(fd) => return Ok(File::from(fd)),
            Err(e) => e,
        };

        tracing::warn!(
            name = %name,
            backend = config.flavor.label(),
            error = %first,
            "Failed to create shared memory, removing existing object and retrying"
        );

        if let Err(e) = shm_unlink(name.as_str()) {
            return Err(Self::create_error(name, first, Some(e)));
        }

        match shm_open(name.as_str(), flags, mode) {
            Ok(fd) => {
                tracing::info!(
                    name = %name,
                    backend = config.flavor.label(),
                    "Reclaimed stale shared memory"
                );
                Ok(File::from(fd))
            }
            Err(e) => Err(Self::create_error(name, e, None)),
        }
    }

    fn create_error(
        name: &SegmentName,
        open: Errno,
        unlink: Option<Errno>,
    ) -> SharedMemoryError {
        let reason = match unlink {
            Some(u) => format!("{} (removal failed: {})", open, u),
            None => open.to_string(),
        };
        if open == Errno::EEXIST {
            SharedMemoryError::NameCollision {
                name: name.to_string(),
                reason,
            }
        } else {
            SharedMemoryError::Acquire {
                name: name.to_string(),
                operation: "create",
                reason,
            }
        }
    }

    fn acquire_error(name: &SegmentName, operation: &'static str, reason: impl ToString) -> SharedMemoryError {
        SharedMemoryError::Acquire {
            name: name.to_string(),
            operation,
            reason: reason.to_string(),
        }
    }
}

impl SegmentBackend for MappedBackend {
    fn create(
        name: &SegmentName,
        size: u32,
        config: &SegmentConfig,
    ) -> Result<Self, SharedMemoryError> {
        let file = Self::open_exclusive(name, config)?;
        let total = HEADER_SIZE + size as usize;

        // From here on, dropping `backend` releases everything acquired so
        // far and removes the name again.
        let mut backend = Self {
            name: name.clone(),
            flavor: config.flavor,
            role: Role::Creator,
            size,
            file: Some(file),
            mapping: None,
            sync_initialized: false,
        };

        if let Some(file) = &backend.file {
            file.set_len(total as u64)
                .map_err(|e| Self::acquire_error(name, "resize", e))?;
            let mapping =
                Mapping::map(file, total).map_err(|e| Self::acquire_error(name, "map", e))?;
            backend.mapping = Some(mapping);
        }

        if let Some(header) = backend.header() {
            // SAFETY: the object was just created exclusively; no other
            // process can have seen a published size yet.
            unsafe { header.initialize(size) }.map_err(|f| SharedMemoryError::SyncInit {
                name: name.to_string(),
                object: f.call,
                reason: f.errno.to_string(),
            })?;
        }
        backend.sync_initialized = true;

        if config.lock_pages {
            backend.pin();
        }

        tracing::debug!(
            name = %name,
            backend = config.flavor.label(),
            size = size,
            "Created shared memory segment"
        );

        Ok(backend)
    }

    fn attach(name: &SegmentName, config: &SegmentConfig) -> Result<Self, SharedMemoryError> {
        let file = match shm_open(name.as_str(), OFlag::O_RDWR, Mode::empty()) {
            Ok(fd) => File::from(fd),
            Err(Errno::ENOENT) => {
                return Err(SharedMemoryError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(Self::acquire_error(name, "open", e)),
        };

        let stored = file
            .metadata()
            .map_err(|e| Self::acquire_error(name, "stat", e))?
            .len();
        if stored < HEADER_SIZE as u64 {
            return Err(SharedMemoryError::Uninitialized {
                name: name.to_string(),
                reason: format!(
                    "backing store is {} bytes, header needs {}",
                    stored, HEADER_SIZE
                ),
            });
        }

        // The payload size is not known yet: map the header alone first.
        let probe = Mapping::map(&file, HEADER_SIZE)
            .map_err(|e| Self::acquire_error(name, "map header of", e))?;
        // SAFETY: probe spans exactly HEADER_SIZE bytes.
        let size = unsafe { SegmentHeader::from_ptr(probe.as_ptr()) }.user_size();
        if let Err(e) = probe.unmap() {
            tracing::error!(
                name = %name,
                backend = config.flavor.label(),
                error = %e,
                "Failed to unmap provisional header mapping"
            );
        }

        if size == 0 {
            return Err(SharedMemoryError::Uninitialized {
                name: name.to_string(),
                reason: "creator has not published a payload size".to_string(),
            });
        }

        let total = HEADER_SIZE + size as usize;
        if stored < total as u64 {
            return Err(SharedMemoryError::Uninitialized {
                name: name.to_string(),
                reason: format!(
                    "backing store is {} bytes, segment needs {}",
                    stored, total
                ),
            });
        }

        let mapping =
            Mapping::map(&file, total).map_err(|e| Self::acquire_error(name, "map", e))?;

        let backend = Self {
            name: name.clone(),
            flavor: config.flavor,
            role: Role::Attacher,
            size,
            file: Some(file),
            mapping: Some(mapping),
            sync_initialized: false,
        };

        if config.lock_pages {
            backend.pin();
        }

        tracing::debug!(
            name = %name,
            backend = config.flavor.label(),
            size = size,
            "Attached to shared memory segment"
        );

        Ok(backend)
    }

    fn lock(&self) -> LockStatus {
        let Some(header) = self.header() else {
            return LockStatus::Unavailable;
        };
        match header.lock() {
            Ok(LockStatus::OwnerDied) => {
                tracing::warn!(
                    name = %self.name,
                    backend = self.flavor.label(),
                    "Previous owner died holding the segment mutex; payload may be inconsistent"
                );
                LockStatus::OwnerDied
            }
            Ok(status) => status,
            Err(failure) => {
                self.log_sync_failure(failure);
                LockStatus::Unavailable
            }
        }
    }

    fn unlock(&self) {
        if let Some(header) = self.header() {
            if let Err(failure) = header.unlock() {
                self.log_sync_failure(failure);
            }
        }
    }

    fn wait(&self) {
        if !self.lock().is_held() {
            return;
        }
        // A failed pthread_cond_wait returns without releasing the mutex,
        // so the unlock is needed on every path.
        self.wait_locked();
        self.unlock();
    }

    fn wait_locked(&self) -> LockStatus {
        let Some(header) = self.header() else {
            return LockStatus::Unavailable;
        };
        match header.wait() {
            Ok(LockStatus::OwnerDied) => {
                tracing::warn!(
                    name = %self.name,
                    backend = self.flavor.label(),
                    "Previous owner died holding the segment mutex during wait"
                );
                LockStatus::OwnerDied
            }
            Ok(status) => status,
            Err(failure) => {
                self.log_sync_failure(failure);
                LockStatus::Unavailable
            }
        }
    }

    fn notify_all(&self) {
        if let Some(header) = self.header() {
            if let Err(failure) = header.broadcast() {
                self.log_sync_failure(failure);
            }
        }
    }

    fn user_ptr(&self) -> *mut u8 {
        match &self.mapping {
            // SAFETY: the mapping spans HEADER_SIZE + size bytes.
            Some(m) => unsafe { m.as_ptr().add(HEADER_SIZE) },
            None => std::ptr::null_mut(),
        }
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn is_valid(&self) -> bool {
        self.file.is_some() && self.mapping.is_some() && self.size > 0
    }

    fn destroy(&mut self) {
        if self.role == Role::Creator && self.sync_initialized {
            if let Some(header) = self.header() {
                // SAFETY: creator teardown, once: sync_initialized is cleared below.
                for failure in unsafe { header.destroy() } {
                    self.log_sync_failure(failure);
                }
            }
            self.sync_initialized = false;
        }

        if let Some(mapping) = self.mapping.take() {
            if let Err(e) = mapping.unmap() {
                tracing::error!(
                    name = %self.name,
                    backend = self.flavor.label(),
                    error = %e,
                    "Failed to unmap shared memory"
                );
            }
        }

        let had_file = self.file.take().is_some();
        if self.role == Role::Creator && had_file {
            match shm_unlink(self.name.as_str()) {
                Ok(()) | Err(Errno::ENOENT) => {}
                Err(e) => tracing::error!(
                    name = %self.name,
                    backend = self.flavor.label(),
                    error = %e,
                    "Failed to unlink shared memory"
                ),
            }
        }

        if had_file {
            tracing::debug!(
                name = %self.name,
                backend = self.flavor.label(),
                role = %self.role,
                "Released shared memory segment"
            );
        }
    }
}

impl Drop for MappedBackend {
    fn drop(&mut self) {
        self.destroy();
    }
}
