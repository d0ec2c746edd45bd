// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Platform backends realizing a process-shared mutex/condition pair.
//!
//! Exactly one backend is compiled per host:
//! - [`MappedBackend`] on Unix: `shm_open` + `mmap`, with a robust pthread
//!   mutex and condition variable embedded in the segment header.
//! - [`KernelBackend`] on Windows: a named binary semaphore, a named
//!   manual-reset event and a paging-file mapping.
//!
//! The two do not offer equal crash guarantees. A kernel semaphore has no
//! owner: if its holder dies, every other locker blocks forever, and
//! [`LockStatus::OwnerDied`] is never reported.

#[cfg(windows)]
mod kernel;
#[cfg(unix)]
mod mapped;

#[cfg(windows)]
pub use kernel::{KernelBackend, KERNEL_HEADER_SIZE};
#[cfg(unix)]
pub use mapped::MappedBackend;

use crate::config::SegmentConfig;
use crate::error::SharedMemoryError;
use crate::types::{LockStatus, SegmentName};

/// Backend compiled for this host.
#[cfg(unix)]
pub type PlatformBackend = MappedBackend;

/// Backend compiled for this host.
#[cfg(windows)]
pub type PlatformBackend = KernelBackend;

/// Capabilities every backend provides to the facade.
///
/// A backend value only exists once create/attach fully succeeded; a
/// failed constructor has already released whatever it acquired.
pub trait SegmentBackend: Send + Sync + Sized {
    /// Create and initialize a new segment with `size` payload bytes.
    fn create(
        name: &SegmentName,
        size: u32,
        config: &SegmentConfig,
    ) -> Result<Self, SharedMemoryError>;

    /// Open an existing segment and discover its payload size.
    fn attach(name: &SegmentName, config: &SegmentConfig) -> Result<Self, SharedMemoryError>;

    /// Block until the lock is held.
    fn lock(&self) -> LockStatus;

    fn unlock(&self);

    /// Self-contained monitor wait: acquire, park until notified, re-acquire,
    /// release. The caller must not hold the lock.
    fn wait(&self);

    /// Monitor wait for a caller that already holds the lock: release, park
    /// until notified, re-acquire.
    fn wait_locked(&self) -> LockStatus;

    /// Wake every waiter. Never blocks.
    fn notify_all(&self);

    /// First payload byte, just past the header.
    fn user_ptr(&self) -> *mut u8;

    /// Payload size in bytes.
    fn size(&self) -> u32;

    /// Whether the backing resources are still held.
    fn is_valid(&self) -> bool;

    /// Role-appropriate teardown. Idempotent; called from drop.
    fn destroy(&mut self);
}
