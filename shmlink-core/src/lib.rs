// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! shmlink Core Library
//!
//! Named shared-memory channel for processes on the same host: a
//! create-or-attach segment whose header carries the payload size and a
//! process-shared mutex and condition variable.

pub mod config;
pub mod error;
pub mod shm;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigLoader, SegmentConfig, FLAVOR_ENV};
pub use error::{HardValidationError, SharedMemoryError, ShmlinkError, ShmlinkResult};
pub use shm::{SegmentGuard, SharedMemory, HEADER_SIZE};
pub use types::{BackendFlavor, LockStatus, Role, SegmentName, MAX_NAME_LEN};
