// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Kernel-object backend: named binary semaphore as the lock, named
//! manual-reset event as the condition, paging-file mapping as the payload.
//!
//! Region layout: `[size: u32][payload]`. Names disappear from the object
//! namespace when the last handle closes, so there is no unlink step and no
//! stale object to reclaim after a crash.

use std::ffi::OsStr;
use std::io;
use std::iter;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, OwnedHandle};
use std::ptr;

use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_ALREADY_EXISTS, ERROR_FILE_NOT_FOUND, HANDLE, INVALID_HANDLE_VALUE,
    WAIT_OBJECT_0,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, OpenFileMappingW, FILE_MAP_ALL_ACCESS, PAGE_READWRITE,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, CreateSemaphoreExW, OpenEventW, OpenSemaphoreW, ReleaseSemaphore, ResetEvent,
    SetEvent, WaitForSingleObject, EVENT_ALL_ACCESS, INFINITE, SEMAPHORE_ALL_ACCESS,
};

use super::SegmentBackend;
use crate::config::SegmentConfig;
use crate::error::SharedMemoryError;
use crate::shm::handle::{owned, View};
use crate::types::{LockStatus, Role, SegmentName};

/// Size prefix in front of the payload.
pub const KERNEL_HEADER_SIZE: usize = std::mem::size_of::<u32>();

const LABEL: &str = "kernel";

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(iter::once(0)).collect()
}

fn raw(handle: &OwnedHandle) -> HANDLE {
    handle.as_raw_handle() as HANDLE
}

/// Segment realized with named Windows kernel objects.
pub struct KernelBackend {
    name: SegmentName,
    role: Role,
    size: u32,
    mutex: Option<OwnedHandle>,
    event: Option<OwnedHandle>,
    mapping: Option<OwnedHandle>,
    view: Option<View>,
}

impl KernelBackend {
    fn empty(name: &SegmentName, role: Role, size: u32) -> Self {
        Self {
            name: name.clone(),
            role,
            size,
            mutex: None,
            event: None,
            mapping: None,
            view: None,
        }
    }

    fn acquire_error(
        name: &SegmentName,
        operation: &'static str,
        error: io::Error,
    ) -> SharedMemoryError {
        SharedMemoryError::Acquire {
            name: name.to_string(),
            operation,
            reason: error.to_string(),
        }
    }

    /// Error for a failed Open* call: a missing name is `NotFound`.
    fn open_error(name: &SegmentName, operation: &'static str) -> SharedMemoryError {
        // SAFETY: reads the calling thread's last-error value.
        if unsafe { GetLastError() } == ERROR_FILE_NOT_FOUND {
            SharedMemoryError::NotFound {
                name: name.to_string(),
            }
        } else {
            Self::acquire_error(name, operation, io::Error::last_os_error())
        }
    }

    fn pin(&self) {
        if let Some(view) = &self.view {
            if let Err(e) = view.pin() {
                tracing::warn!(
                    name = %self.name,
                    backend = LABEL,
                    len = view.len(),
                    error = %e,
                    "Failed to lock shared memory into RAM"
                );
            }
        }
    }

    fn log_failure(&self, call: &'static str) {
        tracing::error!(
            name = %self.name,
            backend = LABEL,
            call = call,
            error = %io::Error::last_os_error(),
            "Synchronization call failed"
        );
    }

    fn signal(&self, event: &OwnedHandle) {
        // SAFETY: event is a live event handle.
        if unsafe { SetEvent(raw(event)) } == 0 {
            self.log_failure("SetEvent");
        }
    }
}

impl SegmentBackend for KernelBackend {
    fn create(
        name: &SegmentName,
        size: u32,
        config: &SegmentConfig,
    ) -> Result<Self, SharedMemoryError> {
        let mut backend = Self::empty(name, Role::Creator, size);
        let mutex_name = wide(&name.with_suffix("_mutex"));
        let event_name = wide(&name.with_suffix("_event"));
        let mapping_name = wide(name.as_str());

        // SAFETY: default security, a NUL-terminated wide name.
        let mutex = unsafe {
            CreateSemaphoreExW(ptr::null(), 1, 1, mutex_name.as_ptr(), 0, SEMAPHORE_ALL_ACCESS)
        };
        backend.mutex = Some(owned(mutex).ok_or_else(|| {
            Self::acquire_error(name, "create semaphore for", io::Error::last_os_error())
        })?);

        // Manual reset, initially not signalled.
        // SAFETY: as above.
        let event = unsafe { CreateEventW(ptr::null(), 1, 0, event_name.as_ptr()) };
        backend.event = Some(owned(event).ok_or_else(|| {
            Self::acquire_error(name, "create event for", io::Error::last_os_error())
        })?);

        let total = (KERNEL_HEADER_SIZE + size as usize) as u64;
        // SAFETY: paging-file backed mapping with a NUL-terminated wide name.
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                ptr::null(),
                PAGE_READWRITE,
                (total >> 32) as u32,
                total as u32,
                mapping_name.as_ptr(),
            )
        };
        let mapping = owned(mapping).ok_or_else(|| {
            Self::acquire_error(name, "create", io::Error::last_os_error())
        })?;
        // SAFETY: reads the calling thread's last-error value.
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            // A live segment owns this name; it cannot be removed from here.
            return Err(SharedMemoryError::NameCollision {
                name: name.to_string(),
                reason: "a mapping with this name is still open".to_string(),
            });
        }

        let view = View::map(&mapping, total as usize)
            .map_err(|e| Self::acquire_error(name, "map", e))?;
        backend.mapping = Some(mapping);
        // SAFETY: the view spans at least KERNEL_HEADER_SIZE bytes.
        unsafe { ptr::write_volatile(view.as_ptr() as *mut u32, size) };
        backend.view = Some(view);

        if config.lock_pages {
            backend.pin();
        }

        tracing::debug!(name = %name, backend = LABEL, size = size, "Created shared memory segment");
        Ok(backend)
    }

    fn attach(name: &SegmentName, config: &SegmentConfig) -> Result<Self, SharedMemoryError> {
        let mut backend = Self::empty(name, Role::Attacher, 0);
        let mutex_name = wide(&name.with_suffix("_mutex"));
        let event_name = wide(&name.with_suffix("_event"));
        let mapping_name = wide(name.as_str());

        // SAFETY: NUL-terminated wide names; handles are not inherited.
        let mutex = unsafe { OpenSemaphoreW(SEMAPHORE_ALL_ACCESS, 0, mutex_name.as_ptr()) };
        backend.mutex = Some(owned(mutex).ok_or_else(|| Self::open_error(name, "open semaphore for"))?);

        // SAFETY: as above.
        let event = unsafe { OpenEventW(EVENT_ALL_ACCESS, 0, event_name.as_ptr()) };
        backend.event = Some(owned(event).ok_or_else(|| Self::open_error(name, "open event for"))?);

        // SAFETY: as above.
        let mapping = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, mapping_name.as_ptr()) };
        let mapping = owned(mapping).ok_or_else(|| Self::open_error(name, "open"))?;

        // Size prefix first, then the full region once the size is known.
        let probe = View::map(&mapping, KERNEL_HEADER_SIZE)
            .map_err(|e| Self::acquire_error(name, "map header of", e))?;
        // SAFETY: the probe spans exactly KERNEL_HEADER_SIZE bytes.
        let size = unsafe { ptr::read_volatile(probe.as_ptr() as *const u32) };
        if let Err(e) = probe.unmap() {
            tracing::error!(name = %name, backend = LABEL, error = %e, "Failed to unmap provisional header view");
        }

        if size == 0 {
            return Err(SharedMemoryError::Uninitialized {
                name: name.to_string(),
                reason: "creator has not published a payload size".to_string(),
            });
        }

        let view = View::map(&mapping, KERNEL_HEADER_SIZE + size as usize)
            .map_err(|e| Self::acquire_error(name, "map", e))?;
        backend.size = size;
        backend.mapping = Some(mapping);
        backend.view = Some(view);

        if config.lock_pages {
            backend.pin();
        }

        tracing::debug!(name = %name, backend = LABEL, size = size, "Attached to shared memory segment");
        Ok(backend)
    }

    fn lock(&self) -> LockStatus {
        let Some(mutex) = &self.mutex else {
            return LockStatus::Unavailable;
        };
        // SAFETY: mutex is a live semaphore handle.
        if unsafe { WaitForSingleObject(raw(mutex), INFINITE) } == WAIT_OBJECT_0 {
            LockStatus::Acquired
        } else {
            self.log_failure("WaitForSingleObject");
            LockStatus::Unavailable
        }
    }

    fn unlock(&self) {
        if let Some(mutex) = &self.mutex {
            // SAFETY: mutex is a live semaphore handle.
            if unsafe { ReleaseSemaphore(raw(mutex), 1, ptr::null_mut()) } == 0 {
                self.log_failure("ReleaseSemaphore");
            }
        }
    }

    fn wait(&self) {
        if !self.lock().is_held() {
            return;
        }
        if self.wait_locked().is_held() {
            self.unlock();
        }
        // A failed re-acquire leaves the semaphore released already.
    }

    /// Not atomic: a notify between the release and the event wait is lost.
    fn wait_locked(&self) -> LockStatus {
        let Some(event) = &self.event else {
            return LockStatus::Unavailable;
        };
        self.unlock();
        // SAFETY: event is a live event handle.
        if unsafe { WaitForSingleObject(raw(event), INFINITE) } != WAIT_OBJECT_0 {
            self.log_failure("WaitForSingleObject");
        }
        self.lock()
    }

    fn notify_all(&self) {
        if let Some(event) = &self.event {
            self.signal(event);
            // SAFETY: event is a live event handle.
            if unsafe { ResetEvent(raw(event)) } == 0 {
                self.log_failure("ResetEvent");
            }
        }
    }

    fn user_ptr(&self) -> *mut u8 {
        match &self.view {
            // SAFETY: the view spans KERNEL_HEADER_SIZE + size bytes.
            Some(v) => unsafe { v.as_ptr().add(KERNEL_HEADER_SIZE) },
            None => ptr::null_mut(),
        }
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn is_valid(&self) -> bool {
        self.mapping.is_some() && self.view.is_some() && self.size > 0
    }

    fn destroy(&mut self) {
        // Waiters must not block on an event that is about to vanish.
        if self.role == Role::Creator {
            if let Some(event) = &self.event {
                self.signal(event);
            }
        }

        if let Some(view) = self.view.take() {
            if let Err(e) = view.unmap() {
                tracing::error!(name = %self.name, backend = LABEL, error = %e, "Failed to unmap shared memory");
            }
        }

        let had_mapping = self.mapping.take().is_some();
        self.event = None;
        self.mutex = None;

        if had_mapping {
            tracing::debug!(name = %self.name, backend = LABEL, role = %self.role, "Released shared memory segment");
        }
    }
}

impl Drop for KernelBackend {
    fn drop(&mut self) {
        self.destroy();
    }
}
