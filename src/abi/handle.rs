//! Purpose: Opaque handle types and their single-owner lifetime discipline.
//! Exports: the `ctn_*` handle structs, `Handle`, pointer helpers, `ctn_live_handles`.
//! Role: Every allocation path mints through `Handle::new`; every free path ends in `Handle::release`.
//! Invariants: `Handle` is not `Clone`; releasing consumes it, so a Rust-side double free cannot compile.
//! Invariants: Live counters move only on mint/release; they count, they do not validate pointers.
#![allow(non_camel_case_types)]

use std::ffi::CStr;
use std::ops::{Deref, DerefMut};
use std::os::raw::c_char;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::abi::diagnostic::malloc_c_string;
use crate::core::device::Device;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::module::CompiledModule;
use crate::core::options::TensorOptions;
use crate::core::tensor::Tensor;
use crate::core::value::DynamicValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum HandleKind {
    Tensor = 0,
    Device = 1,
    TensorOptions = 2,
    ByteBuffer = 3,
    CompiledModule = 4,
    DynamicValue = 5,
}

impl HandleKind {
    pub const ALL: [HandleKind; 6] = [
        HandleKind::Tensor,
        HandleKind::Device,
        HandleKind::TensorOptions,
        HandleKind::ByteBuffer,
        HandleKind::CompiledModule,
        HandleKind::DynamicValue,
    ];

    pub fn from_code(code: i32) -> Option<Self> {
        usize::try_from(code).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            HandleKind::Tensor => "tensor",
            HandleKind::Device => "device",
            HandleKind::TensorOptions => "tensor options",
            HandleKind::ByteBuffer => "byte buffer",
            HandleKind::CompiledModule => "module",
            HandleKind::DynamicValue => "value",
        }
    }
}

static LIVE: [AtomicI64; 6] = [const { AtomicI64::new(0) }; 6];

/// Native object behind one opaque handle type.
pub trait Resource {
    const KIND: HandleKind;
}

pub struct ctn_tensor {
    pub(crate) tensor: Tensor,
}

pub struct ctn_device {
    pub(crate) device: Device,
}

pub struct ctn_tensor_options {
    pub(crate) options: TensorOptions,
}

pub struct ctn_byte_buffer {
    pub(crate) bytes: Vec<u8>,
}

pub struct ctn_module {
    pub(crate) module: CompiledModule,
}

pub struct ctn_value {
    pub(crate) value: DynamicValue,
}

impl Resource for ctn_tensor {
    const KIND: HandleKind = HandleKind::Tensor;
}

impl Resource for ctn_device {
    const KIND: HandleKind = HandleKind::Device;
}

impl Resource for ctn_tensor_options {
    const KIND: HandleKind = HandleKind::TensorOptions;
}

impl Resource for ctn_byte_buffer {
    const KIND: HandleKind = HandleKind::ByteBuffer;
}

impl Resource for ctn_module {
    const KIND: HandleKind = HandleKind::CompiledModule;
}

impl Resource for ctn_value {
    const KIND: HandleKind = HandleKind::DynamicValue;
}

impl From<Tensor> for ctn_tensor {
    fn from(tensor: Tensor) -> Self {
        Self { tensor }
    }
}

impl From<Device> for ctn_device {
    fn from(device: Device) -> Self {
        Self { device }
    }
}

impl From<TensorOptions> for ctn_tensor_options {
    fn from(options: TensorOptions) -> Self {
        Self { options }
    }
}

impl From<Vec<u8>> for ctn_byte_buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<CompiledModule> for ctn_module {
    fn from(module: CompiledModule) -> Self {
        Self { module }
    }
}

impl From<DynamicValue> for ctn_value {
    fn from(value: DynamicValue) -> Self {
        Self { value }
    }
}

/// Sole owner of one heap object on its way to or from the caller.
pub struct Handle<T: Resource> {
    ptr: NonNull<T>,
}

impl<T: Resource> Handle<T> {
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        let live = LIVE[T::KIND as usize].fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(kind = T::KIND.name(), live, "handle minted");
        Self { ptr }
    }

    /// Transfers ownership to the caller.
    pub fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// Reclaims ownership of a pointer produced by `into_raw`; null yields `None`.
    ///
    /// # Safety
    /// `raw` must be null or come from `into_raw` and not have been reclaimed since.
    pub unsafe fn from_raw(raw: *mut T) -> Option<Self> {
        NonNull::new(raw).map(|ptr| Self { ptr })
    }

    pub fn release(self) {
        drop(self);
    }
}

impl<T: Resource> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` came from `Box::leak` and is uniquely owned by this handle.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Resource> DerefMut for Handle<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`; `&mut self` guarantees exclusivity.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T: Resource> Drop for Handle<T> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `Box::leak` and ownership ends here.
        unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
        let live = LIVE[T::KIND as usize].fetch_sub(1, Ordering::Relaxed) - 1;
        tracing::trace!(kind = T::KIND.name(), live, "handle released");
    }
}

/// Shared free path for every `ctn_*_free`.
pub(crate) fn free<T: Resource>(raw: *mut T) {
    // SAFETY: caller contract; double free or foreign pointers are undefined behaviour.
    if let Some(handle) = unsafe { Handle::from_raw(raw) } {
        handle.release();
    }
}

pub(crate) fn borrow<'a, T: Resource>(raw: *mut T) -> Result<&'a T> {
    if raw.is_null() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{} handle is null", T::KIND.name())));
    }
    // SAFETY: non-null; liveness is the caller's contract.
    unsafe { Ok(&*raw) }
}

pub(crate) fn borrow_mut<'a, T: Resource>(raw: *mut T) -> Result<&'a mut T> {
    if raw.is_null() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{} handle is null", T::KIND.name())));
    }
    // SAFETY: non-null; exclusive access is the caller's contract.
    unsafe { Ok(&mut *raw) }
}

/// Mints a handle into `out`. Nothing is allocated when `out` is null.
pub(crate) fn write_handle<T: Resource>(out: *mut *mut T, value: impl Into<T>) -> Result<()> {
    if out.is_null() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("output {} pointer is null", T::KIND.name())));
    }
    let raw = Handle::new(value.into()).into_raw();
    // SAFETY: non-null, caller-provided out-parameter.
    unsafe { *out = raw };
    Ok(())
}

pub(crate) fn write_out<T>(out: *mut T, value: T, name: &str) -> Result<()> {
    if out.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    // SAFETY: non-null, caller-provided out-parameter.
    unsafe { out.write(value) };
    Ok(())
}

/// Writes a malloc'd copy of `text`; the caller releases it with `free`.
pub(crate) fn write_c_string(out: *mut *mut c_char, text: &str, name: &str) -> Result<()> {
    if out.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    // SAFETY: non-null, caller-provided out-parameter.
    unsafe { *out = malloc_c_string(text) };
    Ok(())
}

pub(crate) fn check_len(len: i64, name: &str) -> Result<usize> {
    usize::try_from(len).map_err(|_| {
        Error::new(ErrorKind::Usage).with_message(format!("{name} must be non-negative, got {len}"))
    })
}

pub(crate) fn slice_arg<'a, T>(data: *const T, len: i64, name: &str) -> Result<&'a [T]> {
    let len = check_len(len, name)?;
    if len == 0 {
        return Ok(&[]);
    }
    if data.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    // SAFETY: caller guarantees `len` readable elements at `data`.
    unsafe { Ok(std::slice::from_raw_parts(data, len)) }
}

pub(crate) fn out_slice<'a, T>(data: *mut T, len: usize, name: &str) -> Result<&'a mut [T]> {
    if len == 0 {
        return Ok(&mut []);
    }
    if data.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    // SAFETY: caller guarantees `len` writable elements at `data`.
    unsafe { Ok(std::slice::from_raw_parts_mut(data, len)) }
}

pub(crate) fn str_arg<'a>(text: *const c_char, name: &str) -> Result<&'a str> {
    if text.is_null() {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("{name} is null")));
    }
    // SAFETY: caller passes a NUL-terminated string.
    unsafe { CStr::from_ptr(text) }.to_str().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{name} is not valid UTF-8"))
            .with_source(err)
    })
}

/// Borrows every handle in a caller array.
pub(crate) fn borrow_all<'a, T: Resource>(items: *const *mut T, len: i64, name: &str) -> Result<Vec<&'a T>> {
    slice_arg(items, len, name)?.iter().map(|&raw| borrow(raw)).collect()
}

pub fn live_handles(kind: HandleKind) -> i64 {
    LIVE[kind as usize].load(Ordering::Relaxed)
}

/// Currently-live handles of a kind; -1 for an unknown kind code.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_live_handles(kind: i32) -> i64 {
    HandleKind::from_code(kind).map(live_handles).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handles_are_usage_errors() {
        let err = borrow::<ctn_device>(std::ptr::null_mut()).err().expect("null");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.to_string().contains("device handle is null"));
        assert!(write_out(std::ptr::null_mut::<i64>(), 1, "out").is_err());
    }

    #[test]
    fn into_raw_and_back_releases_once() {
        let raw = Handle::new(ctn_device { device: Device::CPU }).into_raw();
        assert_eq!(borrow(raw).expect("live").device, Device::CPU);
        free(raw);
        free::<ctn_device>(std::ptr::null_mut());
    }

    #[test]
    fn slices_check_length_and_pointer() {
        assert!(slice_arg::<i64>(std::ptr::null(), 0, "dims").expect("empty").is_empty());
        assert!(slice_arg::<i64>(std::ptr::null(), 2, "dims").is_err());
        assert!(slice_arg::<i64>([1i64].as_ptr(), -1, "dims").is_err());
    }

    #[test]
    fn unknown_kind_reports_minus_one() {
        assert_eq!(ctn_live_handles(6), -1);
        assert_eq!(ctn_live_handles(-1), -1);
        assert!(ctn_live_handles(0) >= 0);
    }
}
