// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `shmlink info` command - Show segment properties.

use shmlink_core::{SegmentConfig, HEADER_SIZE};

pub async fn execute(name: &str, config: &SegmentConfig) -> anyhow::Result<()> {
    let segment = super::attach(name, config)?;

    println!("Segment {}", segment.name());
    println!("  Payload: {} bytes", segment.size());
    println!("  Header:  {} bytes", HEADER_SIZE);
    println!("  Backend: {}", segment.flavor());
    Ok(())
}
