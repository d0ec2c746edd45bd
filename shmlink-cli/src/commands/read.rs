// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmlink read` command - Print the payload.

use shmlink_core::SegmentConfig;

pub async fn execute(name: &str, wait: bool, config: &SegmentConfig) -> anyhow::Result<()> {
    let mut segment = super::attach(name, config)?;

    if wait {
        tracing::info!(name = %segment.name(), "Waiting for notification");
        segment = tokio::task::spawn_blocking(move || {
            segment.wait();
            segment
        })
        .await?;
    }

    let text = {
        let Some(guard) = segment.guard() else {
            anyhow::bail!("Failed to lock shared memory '{}'", segment.name());
        };
        let payload = guard.as_slice();
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        String::from_utf8_lossy(&payload[..end]).into_owned()
    };

    println!("{}", text);
    Ok(())
}
