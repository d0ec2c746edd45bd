// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for shmlink.
//!
//! Explicit enum error types, no `Box<dyn Error>` and no `anyhow::Result`
//! in the library. Construction of a segment never panics; failures are
//! reported through these variants and, on the facade, through
//! [`crate::SharedMemory::error`].

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for shmlink.
#[derive(Debug, Error)]
pub enum ShmlinkError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Shared Memory Errors
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration values that cannot be used to open a segment.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Reasons a segment could not be created or attached.
///
/// Owner death is not listed here: it is reported by
/// [`crate::LockStatus::OwnerDied`] and the lock is still held.
#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("Invalid shared memory name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Invalid configuration for shared memory '{name}': {source}")]
    InvalidConfig {
        name: String,
        #[source]
        source: HardValidationError,
    },

    #[error("Shared memory '{name}' does not exist")]
    NotFound { name: String },

    #[error("Shared memory '{name}' already exists and could not be reclaimed: {reason}")]
    NameCollision { name: String, reason: String },

    #[error("Failed to {operation} shared memory '{name}': {reason}")]
    Acquire {
        name: String,
        operation: &'static str,
        reason: String,
    },

    #[error("Shared memory '{name}' is not initialized: {reason}")]
    Uninitialized { name: String, reason: String },

    #[error("Failed to initialize {object} in shared memory '{name}': {reason}")]
    SyncInit {
        name: String,
        object: &'static str,
        reason: String,
    },
}

impl SharedMemoryError {
    /// Name of the segment the failure refers to.
    pub fn name(&self) -> &str {
        match self {
            Self::InvalidName { name, .. }
            | Self::InvalidConfig { name, .. }
            | Self::NotFound { name }
            | Self::NameCollision { name, .. }
            | Self::Acquire { name, .. }
            | Self::Uninitialized { name, .. }
            | Self::SyncInit { name, .. } => name,
        }
    }
}

/// Result type alias using ShmlinkError.
pub type ShmlinkResult<T> = Result<T, ShmlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_error_display() {
        let err = SharedMemoryError::Acquire {
            name: "/demo".to_string(),
            operation: "map",
            reason: "ENOMEM: Cannot allocate memory".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("map"));
        assert!(text.contains("/demo"));
        assert!(text.contains("ENOMEM"));
    }

    #[test]
    fn test_error_chain() {
        let shm_err = SharedMemoryError::NotFound {
            name: "/missing".to_string(),
        };
        assert_eq!(shm_err.name(), "/missing");

        let top: ShmlinkError = shm_err.into();
        assert!(matches!(
            top,
            ShmlinkError::SharedMemory(SharedMemoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_hard_validation_error_display() {
        let err = HardValidationError::InvalidFieldValue {
            field: "mode",
            value: "0o400".to_string(),
            reason: "Owner must be able to read and write".to_string(),
        };
        assert!(err.to_string().contains("mode"));
        assert!(err.to_string().contains("0o400"));
    }
}
