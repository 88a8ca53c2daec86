// Byte buffers returned by tensor encode; the data pointer lives as long as the handle.
use std::ffi::c_void;
use std::ptr;

use crate::abi::handle::{self, ctn_byte_buffer};

/// Null for a null handle.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_byte_buffer_data(buffer: *mut ctn_byte_buffer) -> *mut c_void {
    match handle::borrow_mut(buffer) {
        Ok(buffer) => buffer.bytes.as_mut_ptr() as *mut c_void,
        Err(_) => ptr::null_mut(),
    }
}

/// Zero for a null handle.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_byte_buffer_size(buffer: *mut ctn_byte_buffer) -> i64 {
    handle::borrow(buffer)
        .map(|buffer| buffer.bytes.len() as i64)
        .unwrap_or(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_byte_buffer_free(buffer: *mut ctn_byte_buffer) {
    handle::free(buffer);
}
