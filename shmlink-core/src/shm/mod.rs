// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared Memory IPC module.
//!
//! Zero-copy exchange between unrelated processes through one named,
//! mapped region guarded by a process-shared mutex and condition variable.

pub mod backend;
mod handle;
#[cfg(unix)]
mod header;
mod segment;

#[cfg(unix)]
pub use header::HEADER_SIZE;
pub use segment::{SegmentGuard, SharedMemory};

/// Bytes in front of the payload in a mapped region.
#[cfg(windows)]
pub const HEADER_SIZE: usize = backend::KERNEL_HEADER_SIZE;
