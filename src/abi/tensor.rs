//! Purpose: Tensor facade: construction, persistence, metadata, views and conversions.
//! Exports: `ctn_tensor_*` functions.
//! Role: Thin wrappers that borrow handles, call the engine and mint result handles.
//! Invariants: Every fallible function returns a Diagnostic or null; outputs are written only on success.
//! Invariants: Only `set_data`, `copy_` and `set_requires_grad` mutate their input handle.
use std::ffi::c_void;
use std::os::raw::c_char;
use std::path::Path;

use crate::abi::diagnostic::try_catch;
use crate::abi::handle::{
    self, borrow, borrow_mut, ctn_byte_buffer, ctn_device, ctn_tensor, out_slice, slice_arg, str_arg,
    write_c_string, write_handle, write_out,
};
use crate::core::dtype::{Complex64, Dtype, Scalar};
use crate::core::error::Error;
use crate::core::format;
use crate::core::tensor::Tensor;

fn tensor<'a>(raw: *mut ctn_tensor) -> crate::core::error::Result<&'a Tensor> {
    Ok(&borrow(raw)?.tensor)
}

/// Copies `data_len` bytes of host-order elements into a new tensor.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_new(
    out: *mut *mut ctn_tensor,
    data: *const c_void,
    data_len: i64,
    dtype: i8,
    shape: *const i64,
    ndim: i64,
) -> *mut c_char {
    try_catch(|| {
        let dtype = Dtype::from_code(dtype)?;
        let shape = slice_arg(shape, ndim, "shape")?;
        let bytes = slice_arg(data as *const u8, data_len, "data")?;
        write_handle(out, Tensor::from_bytes(bytes, dtype, shape)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_free(tensor: *mut ctn_tensor) {
    handle::free(tensor);
}

/// Deep copy with independent storage.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_clone(out: *mut *mut ctn_tensor, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.deep_copy()?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_string(out: *mut *mut c_char, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_c_string(out, &self::tensor(tensor)?.to_string(), "output string"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_save(path: *const c_char, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| {
        let path = str_arg(path, "path")?;
        format::save(self::tensor(tensor)?, Path::new(path))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_load(out: *mut *mut ctn_tensor, path: *const c_char) -> *mut c_char {
    try_catch(|| {
        let path = str_arg(path, "path")?;
        write_handle(out, format::load(Path::new(path))?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_encode(out: *mut *mut ctn_byte_buffer, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, format::encode(self::tensor(tensor)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_decode(out: *mut *mut ctn_tensor, data: *const c_void, size: i64) -> *mut c_char {
    try_catch(|| {
        let bytes = slice_arg(data as *const u8, size, "data")?;
        write_handle(out, format::decode(bytes)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_dtype(out: *mut i8, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, self::tensor(tensor)?.dtype().code(), "output dtype"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_dim(out: *mut i64, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, self::tensor(tensor)?.dim() as i64, "output dim"))
}

/// Writes the shape into a caller buffer whose length must equal `dim`.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_shape(out: *mut i64, len: i64, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| {
        let shape = self::tensor(tensor)?.shape();
        let len = handle::check_len(len, "len")?;
        if len != shape.len() {
            return Err(Error::length_mismatch(len, shape.len()));
        }
        out_slice(out, len, "output shape")?.copy_from_slice(shape);
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_numel(out: *mut i64, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, self::tensor(tensor)?.numel() as i64, "output numel"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_nbytes(out: *mut i64, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| {
        let tensor = self::tensor(tensor)?;
        write_out(out, (tensor.numel() * tensor.dtype().element_size()) as i64, "output nbytes")
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_is_floating_point(out: *mut bool, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, self::tensor(tensor)?.dtype().is_floating_point(), "output flag"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_is_complex(out: *mut bool, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, self::tensor(tensor)?.dtype().is_complex(), "output flag"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_view(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    size: *const i64,
    len: i64,
) -> *mut c_char {
    try_catch(|| {
        let size = slice_arg(size, len, "size")?;
        write_handle(out, self::tensor(tensor)?.view(size)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_view_as(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    other: *mut ctn_tensor,
) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.view_as(self::tensor(other)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_reshape(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    size: *const i64,
    len: i64,
) -> *mut c_char {
    try_catch(|| {
        let size = slice_arg(size, len, "size")?;
        write_handle(out, self::tensor(tensor)?.reshape(size)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_reshape_as(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    other: *mut ctn_tensor,
) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.reshape_as(self::tensor(other)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_expand(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    size: *const i64,
    len: i64,
) -> *mut c_char {
    try_catch(|| {
        let size = slice_arg(size, len, "size")?;
        write_handle(out, self::tensor(tensor)?.expand(size)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_expand_as(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    other: *mut ctn_tensor,
) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.expand_as(self::tensor(other)?)?))
}

/// Rebinds `tensor` to `other`'s storage.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_set_data(tensor: *mut ctn_tensor, other: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| {
        let source = self::tensor(other)?.clone();
        borrow_mut(tensor)?.tensor.set_data(&source)
    })
}

/// In-place copy of `other` into `tensor`, broadcasting and casting.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_copy_(tensor: *mut ctn_tensor, other: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| self::tensor(tensor)?.copy_from(self::tensor(other)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_cast_to(out: *mut *mut ctn_tensor, tensor: *mut ctn_tensor, dtype: i8) -> *mut c_char {
    try_catch(|| {
        let dtype = Dtype::from_code(dtype)?;
        write_handle(out, self::tensor(tensor)?.to_dtype(dtype)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_copy_to(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    device: *mut ctn_device,
) -> *mut c_char {
    try_catch(|| {
        let device = borrow(device)?.device;
        write_handle(out, self::tensor(tensor)?.to_device(device)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_to(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    device: *mut ctn_device,
    dtype: i8,
) -> *mut c_char {
    try_catch(|| {
        let device = borrow(device)?.device;
        let dtype = Dtype::from_code(dtype)?;
        write_handle(out, self::tensor(tensor)?.to(device, dtype)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_pin_memory(out: *mut *mut ctn_tensor, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.pin_memory()?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_requires_grad(out: *mut bool, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, self::tensor(tensor)?.requires_grad(), "output flag"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_set_requires_grad(tensor: *mut ctn_tensor, requires_grad: bool) -> *mut c_char {
    try_catch(|| borrow_mut(tensor)?.tensor.set_requires_grad(requires_grad))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_backward(tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| self::tensor(tensor)?.backward())
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_grad(out: *mut *mut ctn_tensor, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.grad()?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_detach(out: *mut *mut ctn_tensor, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.detach()))
}

/// Selects rows along dim 0 with an integer index tensor.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_index(
    out: *mut *mut ctn_tensor,
    tensor: *mut ctn_tensor,
    index: *mut ctn_tensor,
) -> *mut c_char {
    try_catch(|| write_handle(out, self::tensor(tensor)?.index_select0(self::tensor(index)?)?))
}

fn item(tensor: *mut ctn_tensor) -> crate::core::error::Result<Scalar> {
    self::tensor(tensor)?.item()
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_u8(out: *mut u8, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_i64() as u8, "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_i8(out: *mut i8, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_i64() as i8, "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_i16(out: *mut i16, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_i64() as i16, "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_i32(out: *mut i32, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_i64() as i32, "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_i64(out: *mut i64, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_i64(), "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_f32(out: *mut f32, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_f64() as f32, "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_f64(out: *mut f64, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_f64(), "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_bool(out: *mut bool, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_bool(), "output item"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_item_complex(out: *mut Complex64, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, item(tensor)?.as_complex(), "output item"))
}

/// Pointer to the tensor's bytes; valid while any handle sharing its storage lives.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_tensor_to_bytes(out: *mut *const u8, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, self::tensor(tensor)?.data_ptr()?, "output buffer"))
}
