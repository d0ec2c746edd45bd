// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

pub mod create;
pub mod info;
pub mod notify;
pub mod read;
pub mod write;

use anyhow::Context;
use shmlink_core::{SegmentConfig, SharedMemory};

/// Attach to an existing segment or fail with the reason.
pub(crate) fn attach(name: &str, config: &SegmentConfig) -> anyhow::Result<SharedMemory> {
    SharedMemory::try_open(name, 0, config)
        .with_context(|| format!("Shared memory '{}' is unavailable", name))
}
