// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment header stored at the start of every mapped region.
//!
//! Layout: `[SegmentHeader][payload]`. The header is shared by every process
//! that maps the segment, so its layout is a wire format: `repr(C)` with the
//! platform's native pthread object layouts.

use std::cell::UnsafeCell;
use std::mem::{self, MaybeUninit};
use std::sync::atomic::{AtomicU32, Ordering};

use nix::errno::Errno;

use crate::types::LockStatus;

/// Header size in bytes; the payload starts right after it.
pub const HEADER_SIZE: usize = mem::size_of::<SegmentHeader>();

/// Fixed-layout prefix of a memory-mapped segment.
#[repr(C)]
pub struct SegmentHeader {
    /// Payload size. Zero until the creator has finished initialization.
    user_size: AtomicU32,
    /// Process-shared, robust, non-recursive mutex.
    mutex: UnsafeCell<libc::pthread_mutex_t>,
    /// Process-shared condition variable paired with `mutex`.
    condition: UnsafeCell<libc::pthread_cond_t>,
}

// SAFETY: the pthread objects are process-shared primitives designed for
// concurrent use through raw pointers.
unsafe impl Sync for SegmentHeader {}

/// A pthread call that failed, with the object it was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncFailure {
    pub call: &'static str,
    pub errno: Errno,
}

fn check(call: &'static str, rc: libc::c_int) -> Result<(), SyncFailure> {
    if rc == 0 {
        Ok(())
    } else {
        Err(SyncFailure {
            call,
            errno: Errno::from_raw(rc),
        })
    }
}

impl SegmentHeader {
    /// View the start of a mapping as a header.
    ///
    /// # Safety
    /// `ptr` must point to at least [`HEADER_SIZE`] mapped, writable bytes,
    /// suitably aligned (page-aligned mappings always are), that stay mapped
    /// for `'a`.
    pub unsafe fn from_ptr<'a>(ptr: *mut u8) -> &'a Self {
        &*(ptr as *const Self)
    }

    /// Initialize the mutex and condition, then publish `user_size`.
    ///
    /// The size is stored last with release ordering: an attacher that
    /// reads a non-zero size also sees initialized synchronization objects.
    ///
    /// # Safety
    /// Must be called exactly once, by the creator, before any other
    /// process can lock the mutex.
    pub unsafe fn initialize(&self, user_size: u32) -> Result<(), SyncFailure> {
        let mut mutex_attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check(
            "pthread_mutexattr_init",
            libc::pthread_mutexattr_init(mutex_attr.as_mut_ptr()),
        )?;
        let result = Self::init_mutex(self.mutex.get(), mutex_attr.as_mut_ptr());
        libc::pthread_mutexattr_destroy(mutex_attr.as_mut_ptr());
        result?;

        let mut cond_attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
        if let Err(e) = check(
            "pthread_condattr_init",
            libc::pthread_condattr_init(cond_attr.as_mut_ptr()),
        ) {
            libc::pthread_mutex_destroy(self.mutex.get());
            return Err(e);
        }
        let result = Self::init_condition(self.condition.get(), cond_attr.as_mut_ptr());
        libc::pthread_condattr_destroy(cond_attr.as_mut_ptr());
        if let Err(e) = result {
            libc::pthread_mutex_destroy(self.mutex.get());
            return Err(e);
        }

        self.user_size.store(user_size, Ordering::Release);
        Ok(())
    }

    unsafe fn init_mutex(
        mutex: *mut libc::pthread_mutex_t,
        attr: *mut libc::pthread_mutexattr_t,
    ) -> Result<(), SyncFailure> {
        check(
            "pthread_mutexattr_setpshared",
            libc::pthread_mutexattr_setpshared(attr, libc::PTHREAD_PROCESS_SHARED),
        )?;
        #[cfg(any(target_os = "linux", target_os = "android"))]
        check(
            "pthread_mutexattr_setrobust",
            libc::pthread_mutexattr_setrobust(attr, libc::PTHREAD_MUTEX_ROBUST),
        )?;
        check(
            "pthread_mutexattr_settype",
            libc::pthread_mutexattr_settype(attr, libc::PTHREAD_MUTEX_NORMAL),
        )?;
        check("pthread_mutex_init", libc::pthread_mutex_init(mutex, attr))
    }

    unsafe fn init_condition(
        condition: *mut libc::pthread_cond_t,
        attr: *mut libc::pthread_condattr_t,
    ) -> Result<(), SyncFailure> {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        check(
            "pthread_condattr_setclock",
            libc::pthread_condattr_setclock(attr, libc::CLOCK_MONOTONIC),
        )?;
        check(
            "pthread_condattr_setpshared",
            libc::pthread_condattr_setpshared(attr, libc::PTHREAD_PROCESS_SHARED),
        )?;
        check("pthread_cond_init", libc::pthread_cond_init(condition, attr))
    }

    /// Payload size published by the creator, zero if not yet published.
    pub fn user_size(&self) -> u32 {
        self.user_size.load(Ordering::Acquire)
    }

    /// Block until the mutex is held.
    pub fn lock(&self) -> Result<LockStatus, SyncFailure> {
        // SAFETY: the mutex was initialized by the creator before user_size
        // became visible.
        let rc = unsafe { libc::pthread_mutex_lock(self.mutex.get()) };
        self.acquired("pthread_mutex_lock", rc)
    }

    pub fn unlock(&self) -> Result<(), SyncFailure> {
        // SAFETY: see lock().
        check("pthread_mutex_unlock", unsafe {
            libc::pthread_mutex_unlock(self.mutex.get())
        })
    }

    /// Atomically release the held mutex, park on the condition, re-acquire.
    pub fn wait(&self) -> Result<LockStatus, SyncFailure> {
        // SAFETY: the caller holds the mutex; both objects are initialized.
        let rc = unsafe { libc::pthread_cond_wait(self.condition.get(), self.mutex.get()) };
        self.acquired("pthread_cond_wait", rc)
    }

    pub fn broadcast(&self) -> Result<(), SyncFailure> {
        // SAFETY: the condition is initialized.
        check("pthread_cond_broadcast", unsafe {
            libc::pthread_cond_broadcast(self.condition.get())
        })
    }

    /// Wake all waiters, then destroy the condition and the mutex.
    ///
    /// Every step is attempted; the failures are returned in order.
    ///
    /// # Safety
    /// Only the creator may call this, once, at teardown.
    pub unsafe fn destroy(&self) -> Vec<SyncFailure> {
        [
            self.broadcast(),
            check(
                "pthread_cond_destroy",
                libc::pthread_cond_destroy(self.condition.get()),
            ),
            check(
                "pthread_mutex_destroy",
                libc::pthread_mutex_destroy(self.mutex.get()),
            ),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect()
    }

    /// Map a lock/wait return code to a status.
    ///
    /// `EOWNERDEAD` still leaves the mutex held by the caller. The mutex is
    /// marked consistent so later lockers do not see ENOTRECOVERABLE; the
    /// caller is told through [`LockStatus::OwnerDied`].
    fn acquired(&self, call: &'static str, rc: libc::c_int) -> Result<LockStatus, SyncFailure> {
        match rc {
            0 => Ok(LockStatus::Acquired),
            libc::EOWNERDEAD => {
                #[cfg(any(target_os = "linux", target_os = "android"))]
                {
                    // SAFETY: the mutex is held by this thread in the
                    // owner-dead state.
                    let rc = unsafe { libc::pthread_mutex_consistent(self.mutex.get()) };
                    if rc != 0 {
                        tracing::error!(
                            error = %Errno::from_raw(rc),
                            "pthread_mutex_consistent failed"
                        );
                    }
                }
                Ok(LockStatus::OwnerDied)
            }
            rc => Err(SyncFailure {
                call,
                errno: Errno::from_raw(rc),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_field_leads_layout() {
        assert_eq!(mem::offset_of!(SegmentHeader, user_size), 0);
        assert!(
            mem::offset_of!(SegmentHeader, mutex) >= mem::size_of::<u32>(),
            "mutex must not overlap the size field"
        );
        assert!(
            mem::offset_of!(SegmentHeader, condition)
                >= mem::offset_of!(SegmentHeader, mutex) + mem::size_of::<libc::pthread_mutex_t>()
        );
    }

    #[test]
    fn test_header_size_covers_all_fields() {
        let fields = mem::size_of::<u32>()
            + mem::size_of::<libc::pthread_mutex_t>()
            + mem::size_of::<libc::pthread_cond_t>();
        assert!(HEADER_SIZE >= fields);
        assert_eq!(HEADER_SIZE % mem::align_of::<SegmentHeader>(), 0);
    }

    #[test]
    fn test_sync_failure_from_rc() {
        assert!(check("pthread_mutex_init", 0).is_ok());
        let failure = check("pthread_mutex_init", libc::EINVAL).unwrap_err();
        assert_eq!(failure.call, "pthread_mutex_init");
        assert_eq!(failure.errno, Errno::EINVAL);
    }
}
