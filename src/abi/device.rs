// Device handles: parse a descriptor, report its type and index.
use std::os::raw::c_char;

use crate::abi::diagnostic::try_catch;
use crate::abi::handle::{self, borrow, ctn_device, str_arg, write_c_string, write_handle, write_out};
use crate::core::device::Device;

#[unsafe(no_mangle)]
pub extern "C" fn ctn_device_new(out: *mut *mut ctn_device, descriptor: *const c_char) -> *mut c_char {
    try_catch(|| {
        let device: Device = str_arg(descriptor, "device descriptor")?.parse()?;
        write_handle(out, device)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_device_free(device: *mut ctn_device) {
    handle::free(device);
}

/// Non-failing probe: true when `descriptor` parses as a device.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_is_device(descriptor: *const c_char) -> bool {
    str_arg(descriptor, "device descriptor")
        .and_then(|text| text.parse::<Device>())
        .is_ok()
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_device_type(out: *mut i16, device: *mut ctn_device) -> *mut c_char {
    try_catch(|| write_out(out, borrow(device)?.device.kind().code(), "output type"))
}

/// Writes -1 when the descriptor carried no index.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_device_index(out: *mut i8, device: *mut ctn_device) -> *mut c_char {
    try_catch(|| write_out(out, borrow(device)?.device.index().unwrap_or(-1), "output index"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_device_string(out: *mut *mut c_char, device: *mut ctn_device) -> *mut c_char {
    try_catch(|| write_c_string(out, &borrow(device)?.device.to_string(), "output string"))
}
