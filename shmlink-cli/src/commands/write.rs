// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmlink write` command - Store text and wake waiters.

use shmlink_core::{LockStatus, SegmentConfig};

pub async fn execute(name: &str, text: &str, config: &SegmentConfig) -> anyhow::Result<()> {
    let segment = super::attach(name, config)?;
    let bytes = text.as_bytes();

    let written = {
        let Some(mut guard) = segment.guard() else {
            anyhow::bail!("Failed to lock shared memory '{}'", segment.name());
        };
        if guard.status() == LockStatus::OwnerDied {
            tracing::warn!(name = %segment.name(), "Overwriting payload left by a dead writer");
        }

        let payload = guard.as_mut_slice();
        let n = bytes.len().min(payload.len());
        payload[..n].copy_from_slice(&bytes[..n]);
        payload[n..].fill(0);
        n
    };
    segment.notify_all();

    if written < bytes.len() {
        tracing::warn!(
            name = %segment.name(),
            written = written,
            requested = bytes.len(),
            "Text truncated to segment size"
        );
    }
    println!("✓ Wrote {} bytes to {}", written, segment.name());
    Ok(())
}
