// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmlink create` command - Create a segment and hold it.

use std::time::Duration;

use anyhow::Context;
use shmlink_core::{SegmentConfig, SharedMemory};

pub async fn execute(
    name: &str,
    size: u32,
    hold_secs: Option<u64>,
    config: &SegmentConfig,
) -> anyhow::Result<()> {
    anyhow::ensure!(size > 0, "Size must be greater than 0 to create a segment");

    let segment = SharedMemory::try_open(name, size, config)
        .with_context(|| format!("Failed to create shared memory '{}'", name))?;

    println!("✓ Created segment {}", segment.name());
    println!("  Size:    {} bytes", segment.size());
    println!("  Backend: {}", segment.flavor());

    match hold_secs {
        Some(secs) => {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => {
            println!("  Press Ctrl-C to remove it");
            tokio::signal::ctrl_c().await?;
        }
    }

    tracing::info!(name = %segment.name(), "Removing segment");
    drop(segment);

    println!("✓ Segment removed");
    Ok(())
}
