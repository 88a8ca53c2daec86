//! Purpose: The error channel shared by every boundary function.
//! Exports: `try_catch`, `malloc_c_string`, `ctn_diagnostic_free`.
//! Role: Converts `Result`s and panics into a malloc'd Diagnostic or a null success sentinel.
//! Invariants: A failure always yields a non-null, NUL-terminated string (possibly empty text).
//! Invariants: Panics never unwind across `extern "C"`; they surface as `Internal` diagnostics.
use std::alloc::{Layout, handle_alloc_error};
use std::any::Any;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use crate::core::error::{Error, ErrorKind, Result};

/// Runs `f`; null on success, otherwise a Diagnostic the caller releases with `free`.
pub(crate) fn try_catch<F>(f: F) -> *mut c_char
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ptr::null_mut(),
        Ok(Err(err)) => {
            tracing::debug!(kind = err.kind().label(), error = %err, "boundary call failed");
            malloc_c_string(&err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(panic = %message, "panic captured at boundary");
            let err = Error::new(ErrorKind::Internal).with_message(format!("panic: {message}"));
            malloc_c_string(&err.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic across FFI boundary".to_string()
    }
}

/// Copies `text` into a `malloc` allocation; text after an interior NUL is dropped.
pub(crate) fn malloc_c_string(text: &str) -> *mut c_char {
    let bytes = text.as_bytes();
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    // SAFETY: the allocation holds `len + 1` bytes; we write exactly that many.
    unsafe {
        let out = libc::malloc(len + 1) as *mut u8;
        if out.is_null() {
            handle_alloc_error(Layout::from_size_align(len + 1, 1).unwrap_or(Layout::new::<u8>()));
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), out, len);
        *out.add(len) = 0;
        out as *mut c_char
    }
}

/// Releases a Diagnostic (or any string this library returned); null is ignored.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_diagnostic_free(diagnostic: *mut c_char) {
    if diagnostic.is_null() {
        return;
    }
    // SAFETY: every string handed out by this library comes from `malloc_c_string`.
    unsafe { libc::free(diagnostic as *mut libc::c_void) }
}
