// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SharedMemoryError;

/// Namespace separator every segment name starts with.
pub const NAME_SEPARATOR: char = '/';

/// Longest segment name accepted by the host, separator included.
#[cfg(windows)]
pub const MAX_NAME_LEN: usize = windows_sys::Win32::Foundation::MAX_PATH as usize;

/// Longest segment name accepted by the host, separator included.
#[cfg(not(windows))]
pub const MAX_NAME_LEN: usize = 254;

/// Normalized segment name.
///
/// Always begins with exactly one `/` and is at most [`MAX_NAME_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName(String);

impl SegmentName {
    /// Normalize a caller-supplied name.
    ///
    /// Leading separators are collapsed into one, then the result is cut to
    /// [`MAX_NAME_LEN`] bytes on a character boundary.
    pub fn new(raw: &str) -> Result<Self, SharedMemoryError> {
        let stem = raw.trim_start_matches(NAME_SEPARATOR);
        if stem.is_empty() {
            return Err(SharedMemoryError::InvalidName {
                name: raw.to_string(),
                reason: "Name cannot be empty",
            });
        }
        if stem.contains('\0') {
            return Err(SharedMemoryError::InvalidName {
                name: raw.to_string(),
                reason: "Name cannot contain NUL bytes",
            });
        }

        let mut name = String::with_capacity(MAX_NAME_LEN.min(stem.len() + 1));
        name.push(NAME_SEPARATOR);
        name.push_str(stem);
        truncate_on_boundary(&mut name, MAX_NAME_LEN);

        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name with `suffix` appended, shortened first so the whole still fits
    /// in [`MAX_NAME_LEN`]. Used for companion kernel objects.
    pub fn with_suffix(&self, suffix: &str) -> String {
        let mut base = self.0.clone();
        truncate_on_boundary(&mut base, MAX_NAME_LEN.saturating_sub(suffix.len()));
        base.push_str(suffix);
        base
    }
}

fn truncate_on_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SegmentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which side of the create-or-attach protocol a facade plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Allocated and initialized the segment; destroys it on drop.
    Creator,
    /// Opened an existing segment; only unmaps on drop.
    Attacher,
}

impl Role {
    /// A positive size requests creation, zero requests attachment.
    pub fn for_size(size: u32) -> Self {
        if size > 0 {
            Self::Creator
        } else {
            Self::Attacher
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Attacher => "attacher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of acquiring the segment lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockStatus {
    /// The lock is held.
    Acquired,
    /// The lock is held, but its previous owner terminated while holding
    /// it. The mutex has been marked consistent again; the payload may be
    /// half-written.
    OwnerDied,
    /// The lock is not held: the segment is invalid or the primitive failed.
    Unavailable,
}

impl LockStatus {
    /// Whether the caller now owns the lock.
    pub fn is_held(&self) -> bool {
        matches!(self, Self::Acquired | Self::OwnerDied)
    }
}

/// Label for the memory-mapped backend.
///
/// Both flavors run the same implementation; the flavor only tags log
/// records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFlavor {
    Posix,
    #[default]
    SysV,
}

impl BackendFlavor {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::SysV => "sysv",
        }
    }
}

impl fmt::Display for BackendFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_gets_separator() {
        let name = SegmentName::new("foo").unwrap();
        assert_eq!(name.as_str(), "/foo");
    }

    #[test]
    fn test_name_keeps_single_separator() {
        assert_eq!(SegmentName::new("/foo").unwrap().as_str(), "/foo");
        assert_eq!(SegmentName::new("///foo").unwrap().as_str(), "/foo");
    }

    #[test]
    fn test_name_truncated_to_max() {
        let long = "x".repeat(MAX_NAME_LEN * 2);
        let name = SegmentName::new(&long).unwrap();
        assert_eq!(name.as_str().len(), MAX_NAME_LEN);
        assert!(name.as_str().starts_with('/'));
        assert!(!name.as_str()[1..].starts_with('/'));
    }

    #[test]
    fn test_name_truncation_respects_char_boundary() {
        // 'é' is two bytes, so an odd cut point would land mid-character.
        let long = "é".repeat(MAX_NAME_LEN);
        let name = SegmentName::new(&long).unwrap();
        assert!(name.as_str().len() <= MAX_NAME_LEN);
        assert!(name.as_str().len() >= MAX_NAME_LEN - 1);
    }

    #[test]
    fn test_name_rejects_empty() {
        assert!(matches!(
            SegmentName::new(""),
            Err(SharedMemoryError::InvalidName { .. })
        ));
        assert!(matches!(
            SegmentName::new("///"),
            Err(SharedMemoryError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_name_rejects_nul() {
        assert!(SegmentName::new("bad\0name").is_err());
    }

    #[test]
    fn test_with_suffix_fits() {
        let long = "y".repeat(MAX_NAME_LEN);
        let name = SegmentName::new(&long).unwrap();
        let mutex = name.with_suffix("_mutex");
        assert_eq!(mutex.len(), MAX_NAME_LEN);
        assert!(mutex.ends_with("_mutex"));

        let short = SegmentName::new("demo").unwrap();
        assert_eq!(short.with_suffix("_event"), "/demo_event");
    }

    #[test]
    fn test_role_for_size() {
        assert_eq!(Role::for_size(16), Role::Creator);
        assert_eq!(Role::for_size(0), Role::Attacher);
    }

    #[test]
    fn test_lock_status_held() {
        assert!(LockStatus::Acquired.is_held());
        assert!(LockStatus::OwnerDied.is_held());
        assert!(!LockStatus::Unavailable.is_held());
    }

    #[test]
    fn test_flavor_default_and_labels() {
        assert_eq!(BackendFlavor::default(), BackendFlavor::SysV);
        assert_eq!(BackendFlavor::Posix.to_string(), "posix");
        assert_eq!(BackendFlavor::SysV.label(), "sysv");
    }
}
