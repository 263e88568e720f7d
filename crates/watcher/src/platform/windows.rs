//! Native backend: overlapped `ReadDirectoryChangesW` on an I/O completion port

use super::dequeue::{Dequeued, Outcome, WAKE_KEY};
use super::{Completion, PortWaker, WatchBackend};
use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::session::SessionId;
use dirwatch_core::{ChangeRecord, NotifyBuffer, WatchRoot};
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::Path;
use std::ptr;
use std::sync::Arc;
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, ReadDirectoryChangesW, FILE_FLAG_BACKUP_SEMANTICS, FILE_FLAG_OVERLAPPED,
    FILE_LIST_DIRECTORY, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::Threading::INFINITE;
use windows_sys::Win32::System::IO::{
    CancelIoEx, CreateIoCompletionPort, GetOverlappedResult, GetQueuedCompletionStatus,
    PostQueuedCompletionStatus, OVERLAPPED,
};

pub(crate) fn open(
    root: &WatchRoot,
    config: &WatchConfig,
    id: SessionId,
) -> Result<(NativeBackend, Arc<CompletionPort>)> {
    let buffer = NotifyBuffer::new(config.buffer_size);
    let dir = open_directory(root.as_path())
        .map_err(|err| WatchError::io("open watch directory", err))?;
    let port = CompletionPort::new().map_err(|err| WatchError::io("create completion port", err))?;
    port.bind(&dir, id.key())
        .map_err(|err| WatchError::io("bind directory to completion port", err))?;

    debug!(session = %id, root = %root.as_str(), buffer = buffer.len(), "directory opened for overlapped reads");

    let port = Arc::new(port);
    let backend = NativeBackend {
        port: Arc::clone(&port),
        dir,
        buffer,
        // SAFETY: OVERLAPPED is a plain C struct for which all-zero is the
        // documented initial state.
        overlapped: Box::new(unsafe { std::mem::zeroed() }),
        pending: false,
        key: id.key(),
        recursive: config.recursive,
        filter: config.filter_mask(),
    };
    Ok((backend, port))
}

fn open_directory(path: &Path) -> io::Result<OwnedHandle> {
    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();

    // SAFETY: `wide` is NUL terminated and outlives the call.
    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            FILE_LIST_DIRECTORY,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OVERLAPPED,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `handle` is a freshly opened handle nobody else owns.
    Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
}

fn raw(handle: &OwnedHandle) -> HANDLE {
    handle.as_raw_handle() as HANDLE
}

/// An I/O completion port, closed on drop
pub(crate) struct CompletionPort {
    handle: OwnedHandle,
}

impl CompletionPort {
    fn new() -> io::Result<Self> {
        // SAFETY: creating a fresh port is always sound.
        let handle = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, ptr::null_mut(), 0, 1) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            // SAFETY: freshly created, owned by nobody else.
            handle: unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) },
        })
    }

    fn bind(&self, file: &OwnedHandle, key: usize) -> io::Result<()> {
        // SAFETY: both handles are open for the duration of the call.
        let bound = unsafe { CreateIoCompletionPort(raw(file), raw(&self.handle), key, 0) };
        if bound.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl PortWaker for CompletionPort {
    fn wake(&self) -> io::Result<()> {
        // SAFETY: the port is open; a null OVERLAPPED is allowed.
        let posted = unsafe { PostQueuedCompletionStatus(raw(&self.handle), 0, WAKE_KEY, ptr::null()) };
        if posted == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Directory handle, read buffer and OVERLAPPED state of one session
///
/// Fields drop in declaration order: port, directory, buffer.
pub(crate) struct NativeBackend {
    port: Arc<CompletionPort>,
    dir: OwnedHandle,
    buffer: NotifyBuffer,
    overlapped: Box<OVERLAPPED>,
    pending: bool,
    key: usize,
    recursive: bool,
    filter: u32,
}

// SAFETY: the raw pointers inside OVERLAPPED are only touched by the thread
// that owns the backend, and the OS only writes through them while a read is
// pending, which `Drop` waits out.
unsafe impl Send for NativeBackend {}

impl NativeBackend {
    fn overlapped_ptr(&mut self) -> *mut OVERLAPPED {
        &mut *self.overlapped
    }
}

impl WatchBackend for NativeBackend {
    fn arm(&mut self) -> io::Result<()> {
        if self.pending {
            return Ok(());
        }

        // SAFETY: no read is pending, so the OS holds no reference to it.
        *self.overlapped = unsafe { std::mem::zeroed() };
        let overlapped = self.overlapped_ptr();
        let mut returned = 0u32;

        // SAFETY: buffer and OVERLAPPED are heap allocations owned by `self`
        // and stay alive until the read completes or is cancelled in `Drop`.
        let issued = unsafe {
            ReadDirectoryChangesW(
                raw(&self.dir),
                self.buffer.as_mut_ptr().cast(),
                self.buffer.len() as u32,
                i32::from(self.recursive),
                self.filter,
                &mut returned,
                overlapped,
                None,
            )
        };
        if issued == 0 {
            return Err(io::Error::last_os_error());
        }
        self.pending = true;
        Ok(())
    }

    fn wait(&mut self, batch: &mut Vec<ChangeRecord>) -> io::Result<Completion> {
        let mut transferred = 0u32;
        let mut key = 0usize;
        let mut completed: *mut OVERLAPPED = ptr::null_mut();

        // SAFETY: out-pointers are valid locals; the port is open.
        let ok = unsafe {
            GetQueuedCompletionStatus(
                raw(&self.port.handle),
                &mut transferred,
                &mut key,
                &mut completed,
                INFINITE,
            )
        } != 0;
        let os_error = (!ok).then(io::Error::last_os_error);

        let ours = ptr::eq(completed, self.overlapped_ptr());
        if ours {
            self.pending = false;
        }

        let dequeued = Dequeued {
            ok,
            transferred,
            key,
            no_overlapped: completed.is_null(),
            ours,
        };
        match dequeued.classify(self.key) {
            Outcome::Failed => {
                return Err(os_error.unwrap_or_else(|| io::Error::other("completion port wait failed")));
            }
            Outcome::Completed(Completion::Batch) => {}
            Outcome::Completed(other) => return Ok(other),
        }

        for entry in self.buffer.entries(transferred as usize) {
            match entry {
                Ok(entry) => batch.push(entry.into_record()),
                Err(err) => {
                    warn!(error = %err, "malformed change batch; dropping the remainder");
                    break;
                }
            }
        }
        Ok(Completion::Batch)
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        if !self.pending {
            return;
        }
        let overlapped = self.overlapped_ptr();
        let mut transferred = 0u32;
        // SAFETY: the read is pending on `dir` with this OVERLAPPED; waiting
        // for it to finish keeps the OS from writing into freed memory.
        unsafe {
            CancelIoEx(raw(&self.dir), overlapped);
            GetOverlappedResult(raw(&self.dir), overlapped, &mut transferred, 1);
        }
        self.pending = false;
    }
}
