// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmlink notify` command - Wake all waiters.

use shmlink_core::SegmentConfig;

pub async fn execute(name: &str, config: &SegmentConfig) -> anyhow::Result<()> {
    let segment = super::attach(name, config)?;
    segment.notify_all();

    tracing::debug!(name = %segment.name(), "Notified waiters");
    println!("✓ Notified waiters on {}", segment.name());
    Ok(())
}
