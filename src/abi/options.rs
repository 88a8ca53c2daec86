// Tensor options handles; every setter mints a new handle and leaves the input untouched.
use std::os::raw::c_char;

use crate::abi::diagnostic::try_catch;
use crate::abi::handle::{self, borrow, ctn_device, ctn_tensor_options, write_handle, write_out};
use crate::core::dtype::Dtype;
use crate::core::error::Result;
use crate::core::options::{Layout, MemoryFormat, TensorOptions};

fn rebuild(
    out: *mut *mut ctn_tensor_options,
    options: *mut ctn_tensor_options,
    update: impl FnOnce(TensorOptions) -> Result<TensorOptions>,
) -> *mut c_char {
    try_catch(|| {
        let current = borrow(options)?.options;
        write_handle(out, update(current)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_new(out: *mut *mut ctn_tensor_options) -> *mut c_char {
    try_catch(|| write_handle(out, TensorOptions::default()))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_free(options: *mut ctn_tensor_options) {
    handle::free(options);
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_dtype(
    out: *mut *mut ctn_tensor_options,
    options: *mut ctn_tensor_options,
    dtype: i8,
) -> *mut c_char {
    rebuild(out, options, |current| Ok(current.with_dtype(Dtype::from_code(dtype)?)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_layout(
    out: *mut *mut ctn_tensor_options,
    options: *mut ctn_tensor_options,
    layout: i8,
) -> *mut c_char {
    rebuild(out, options, |current| Ok(current.with_layout(Layout::from_code(layout)?)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_memory_format(
    out: *mut *mut ctn_tensor_options,
    options: *mut ctn_tensor_options,
    memory_format: i8,
) -> *mut c_char {
    rebuild(out, options, |current| {
        Ok(current.with_memory_format(MemoryFormat::from_code(memory_format)?))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_device(
    out: *mut *mut ctn_tensor_options,
    options: *mut ctn_tensor_options,
    device: *mut ctn_device,
) -> *mut c_char {
    rebuild(out, options, |current| Ok(current.with_device(borrow(device)?.device)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_requires_grad(
    out: *mut *mut ctn_tensor_options,
    options: *mut ctn_tensor_options,
    requires_grad: bool,
) -> *mut c_char {
    rebuild(out, options, |current| Ok(current.with_requires_grad(requires_grad)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_pinned_memory(
    out: *mut *mut ctn_tensor_options,
    options: *mut ctn_tensor_options,
    pinned_memory: bool,
) -> *mut c_char {
    rebuild(out, options, |current| Ok(current.with_pinned_memory(pinned_memory)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_options_get_dtype(out: *mut i8, options: *mut ctn_tensor_options) -> *mut c_char {
    try_catch(|| write_out(out, borrow(options)?.options.dtype.code(), "output dtype"))
}
