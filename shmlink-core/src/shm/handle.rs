// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Owned OS resources backing a segment.
//!
//! Every handle and mapping is released on drop, so a constructor that bails
//! out half-way leaks nothing. Explicit release methods exist where the
//! caller needs to observe the failure.

#[cfg(unix)]
pub use self::unix::Mapping;

#[cfg(windows)]
pub use self::windows::{owned, View};

#[cfg(unix)]
mod unix {
    use std::fs::File;
    use std::mem::ManuallyDrop;
    use std::num::NonZeroUsize;
    use std::ptr::NonNull;

    use nix::errno::Errno;
    use nix::sys::mman::{self, MapFlags, ProtFlags};

    /// A shared read/write mapping of a shared memory object.
    ///
    /// Unmapped on drop.
    #[derive(Debug)]
    pub struct Mapping {
        ptr: NonNull<u8>,
        len: usize,
    }

    // SAFETY: a Mapping owns its region; access to the bytes is synchronized
    // by the segment lock.
    unsafe impl Send for Mapping {}
    unsafe impl Sync for Mapping {}

    impl Mapping {
        /// Map the first `len` bytes of `file`.
        pub fn map(file: &File, len: usize) -> nix::Result<Self> {
            let length = NonZeroUsize::new(len).ok_or(Errno::EINVAL)?;

            // SAFETY: no address hint, the fd is open for read/write and the
            // returned region is owned by this Mapping until unmapped.
            let ptr = unsafe {
                mman::mmap(
                    None,
                    length,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED,
                    file,
                    0,
                )?
            };

            Ok(Self {
                ptr: ptr.cast(),
                len,
            })
        }

        pub fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        pub fn len(&self) -> usize {
            self.len
        }

        /// Keep the mapped pages resident in physical memory.
        pub fn pin(&self) -> nix::Result<()> {
            // SAFETY: ptr/len describe exactly this live mapping.
            unsafe { mman::mlock(self.ptr.cast(), self.len) }
        }

        /// Unmap now, reporting failure instead of logging it.
        pub fn unmap(self) -> nix::Result<()> {
            let this = ManuallyDrop::new(self);
            // SAFETY: ptr/len came from mmap and are released exactly once.
            unsafe { mman::munmap(this.ptr.cast(), this.len) }
        }
    }

    impl Drop for Mapping {
        fn drop(&mut self) {
            // SAFETY: ptr/len came from mmap and are released exactly once.
            if let Err(e) = unsafe { mman::munmap(self.ptr.cast(), self.len) } {
                tracing::error!(len = self.len, error = %e, "Failed to unmap shared memory");
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::ffi::c_void;
    use std::io;
    use std::mem::ManuallyDrop;
    use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};

    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::System::Memory::{
        MapViewOfFile, UnmapViewOfFile, VirtualLock, FILE_MAP_ALL_ACCESS,
        MEMORY_MAPPED_VIEW_ADDRESS,
    };

    /// Take ownership of a raw kernel handle, `None` for a null handle.
    pub fn owned(raw: HANDLE) -> Option<OwnedHandle> {
        if raw.is_null() {
            None
        } else {
            // SAFETY: a non-null handle returned by a Create*/Open* call is
            // owned by nobody else.
            Some(unsafe { OwnedHandle::from_raw_handle(raw) })
        }
    }

    /// A mapped view of a file-mapping object. Unmapped on drop.
    pub struct View {
        addr: MEMORY_MAPPED_VIEW_ADDRESS,
        len: usize,
    }

    // SAFETY: a View owns its region; access to the bytes is synchronized by
    // the segment lock.
    unsafe impl Send for View {}
    unsafe impl Sync for View {}

    impl View {
        pub fn map(mapping: &OwnedHandle, len: usize) -> io::Result<Self> {
            // SAFETY: mapping is a live file-mapping handle.
            let addr = unsafe {
                MapViewOfFile(mapping.as_raw_handle() as HANDLE, FILE_MAP_ALL_ACCESS, 0, 0, len)
            };
            if addr.Value.is_null() {
                return Err(io::Error::last_os_error());
            }
            Ok(Self { addr, len })
        }

        pub fn as_ptr(&self) -> *mut u8 {
            self.addr.Value.cast()
        }

        pub fn len(&self) -> usize {
            self.len
        }

        pub fn pin(&self) -> io::Result<()> {
            // SAFETY: addr/len describe exactly this live view.
            if unsafe { VirtualLock(self.addr.Value as *const c_void, self.len) } == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        pub fn unmap(self) -> io::Result<()> {
            let this = ManuallyDrop::new(self);
            // SAFETY: the view is released exactly once.
            if unsafe { UnmapViewOfFile(this.addr) } == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    impl Drop for View {
        fn drop(&mut self) {
            // SAFETY: the view is released exactly once.
            if unsafe { UnmapViewOfFile(self.addr) } == 0 {
                tracing::error!(
                    len = self.len,
                    error = %io::Error::last_os_error(),
                    "Failed to unmap shared memory view"
                );
            }
        }
    }
}
