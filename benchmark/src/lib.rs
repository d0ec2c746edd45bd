// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared helpers for the shmlink benchmarks.
//!
//! # Benchmark Categories
//!
//! - **Lock**: uncontended lock/unlock round trips
//! - **Payload**: guarded copies into segments of various sizes
//! - **Notify**: wait/notify ping-pong between two attachments

use shmlink_core::{SegmentConfig, SharedMemory};

/// Segment name unique to this process and benchmark.
pub fn unique_name(tag: &str) -> String {
    format!("/shmlink-bench-{}-{}", tag, std::process::id())
}

/// Configuration used by every benchmark. Pages are not pinned so large
/// segments stay clear of RLIMIT_MEMLOCK.
pub fn bench_config() -> SegmentConfig {
    SegmentConfig {
        lock_pages: false,
        ..SegmentConfig::default()
    }
}

/// Create a segment for a benchmark, panicking if that fails.
pub fn create_segment(tag: &str, size: u32) -> SharedMemory {
    let name = unique_name(tag);
    match SharedMemory::try_open(&name, size, &bench_config()) {
        Ok(segment) => segment,
        Err(e) => panic!("Failed to create benchmark segment {}: {}", name, e),
    }
}
