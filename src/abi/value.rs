//! Purpose: Dynamic value codec at the C boundary.
//! Exports: `ctn_value_from_*`, `ctn_value_is_*`, `ctn_value_length_*`, `ctn_value_to_*`, `ctn_value_free`.
//! Role: Decode is a handshake: probe the kind, query the length, allocate, then materialize.
//! Invariants: Materializing accessors validate kind and length before touching the caller's buffer.
//! Invariants: Tensor and device handles extracted from a value are new handles owned by the caller.
use std::os::raw::c_char;

use crate::abi::diagnostic::try_catch;
use crate::abi::handle::{
    self, Handle, Resource, borrow, borrow_all, check_len, ctn_device, ctn_tensor, ctn_value, out_slice, slice_arg,
    str_arg, write_c_string, write_handle, write_out,
};
use crate::core::dtype::Complex64;
use crate::core::error::Result;
use crate::core::value::{DynamicValue, ElementType, ValueKind};

fn value<'a>(raw: *mut ctn_value) -> Result<&'a DynamicValue> {
    Ok(&borrow(raw)?.value)
}

fn values(items: *const *mut ctn_value, count: i64, name: &str) -> Result<Vec<DynamicValue>> {
    Ok(borrow_all(items, count, name)?
        .into_iter()
        .map(|handle| handle.value.clone())
        .collect())
}

/// Mints one handle per item into a caller array already checked to hold exactly `items.len()` slots.
fn mint_into<T: Resource, V: Into<T>>(slots: &mut [*mut T], items: Vec<V>) {
    for (slot, item) in slots.iter_mut().zip(items) {
        *slot = Handle::new(item.into()).into_raw();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_free(value: *mut ctn_value) {
    handle::free(value);
}

/// Discriminant code, for callers that switch instead of probing predicates.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_kind(out: *mut i32, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.kind().code(), "output kind"))
}

// --- constructors ---------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_none(out: *mut *mut ctn_value) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::None))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_bool(out: *mut *mut ctn_value, value: bool) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::Bool(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_int(out: *mut *mut ctn_value, value: i64) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::Int(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_double(out: *mut *mut ctn_value, value: f64) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::Double(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_complex(out: *mut *mut ctn_value, value: Complex64) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::ComplexDouble(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_string(out: *mut *mut ctn_value, text: *const c_char) -> *mut c_char {
    try_catch(|| {
        let text = str_arg(text, "string")?;
        write_handle(out, DynamicValue::String(text.to_owned()))
    })
}

/// The value refers to the same storage; the tensor handle stays owned by the caller.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_tensor(out: *mut *mut ctn_value, tensor: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::Tensor(borrow(tensor)?.tensor.clone())))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_device(out: *mut *mut ctn_value, device: *mut ctn_device) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::Device(borrow(device)?.device)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_bool_list(out: *mut *mut ctn_value, data: *const bool, count: i64) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::from_bool_list(slice_arg(data, count, "data")?)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_int_list(out: *mut *mut ctn_value, data: *const i64, count: i64) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::from_int_list(slice_arg(data, count, "data")?)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_double_list(out: *mut *mut ctn_value, data: *const f64, count: i64) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::from_double_list(slice_arg(data, count, "data")?)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_complex_list(
    out: *mut *mut ctn_value,
    data: *const Complex64,
    count: i64,
) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::from_complex_list(slice_arg(data, count, "data")?)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_tensor_list(
    out: *mut *mut ctn_value,
    tensors: *const *mut ctn_tensor,
    count: i64,
) -> *mut c_char {
    try_catch(|| {
        let tensors: Vec<_> = borrow_all(tensors, count, "tensors")?
            .into_iter()
            .map(|handle| handle.tensor.clone())
            .collect();
        write_handle(out, DynamicValue::from_tensor_list(&tensors))
    })
}

/// Elements are copied; the element handles stay owned by the caller.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_list(
    out: *mut *mut ctn_value,
    items: *const *mut ctn_value,
    count: i64,
) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::from_list(values(items, count, "items")?)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_tuple(
    out: *mut *mut ctn_value,
    items: *const *mut ctn_value,
    count: i64,
) -> *mut c_char {
    try_catch(|| write_handle(out, DynamicValue::from_tuple(values(items, count, "items")?)))
}

/// `keys[i]` maps to `values[i]`; both arrays hold `count` handles.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_from_generic_dict(
    out: *mut *mut ctn_value,
    keys: *const *mut ctn_value,
    values: *const *mut ctn_value,
    count: i64,
) -> *mut c_char {
    try_catch(|| {
        let keys = self::values(keys, count, "keys")?;
        let values = self::values(values, count, "values")?;
        write_handle(out, DynamicValue::from_generic_dict(keys, values)?)
    })
}

// --- predicates -----------------------------------------------------------

fn probe(out: *mut bool, value: *mut ctn_value, test: impl FnOnce(&DynamicValue) -> bool) -> *mut c_char {
    try_catch(|| write_out(out, test(self::value(value)?), "output flag"))
}

fn probe_kind(out: *mut bool, value: *mut ctn_value, kind: ValueKind) -> *mut c_char {
    probe(out, value, |value| value.is_kind(kind))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_none(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::None)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_bool(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Bool)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_int(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Int)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_double(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Double)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_complex(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::ComplexDouble)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_string(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::String)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_tensor(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Tensor)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_device(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Device)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_list(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::List)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_tuple(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Tuple)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_generic_dict(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::GenericDict)
}

/// True for bool, int, double and complex values.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_scalar(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe(out, value, DynamicValue::is_scalar)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_bool_list(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe(out, value, |value| value.is_list_of(ElementType::Bool))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_int_list(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe(out, value, |value| value.is_list_of(ElementType::Int))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_double_list(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe(out, value, |value| value.is_list_of(ElementType::Double))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_complex_list(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe(out, value, |value| value.is_list_of(ElementType::ComplexDouble))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_tensor_list(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe(out, value, |value| value.is_list_of(ElementType::Tensor))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_storage(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Storage)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_capsule(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Capsule)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_custom_class(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::CustomClass)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_future(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Future)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_rref(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::RRef)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_quantizer(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Quantizer)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_object(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Object)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_module(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Module)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_py_object(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::PyObject)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_enum(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Enum)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_stream(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Stream)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_generator(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::Generator)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_is_ptr_type(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    probe_kind(out, value, ValueKind::PtrType)
}

// --- length queries -------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_length_tuple(out: *mut i64, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.tuple_len()? as i64, "output length"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_length_list(out: *mut i64, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.list_len()? as i64, "output length"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_length_dict(out: *mut i64, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.dict_len()? as i64, "output length"))
}

// --- scalar accessors -----------------------------------------------------

/// Writes the malloc'd text `"None"`.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_none(out: *mut *mut c_char, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_c_string(out, self::value(value)?.to_none()?, "output string"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_bool(out: *mut bool, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.to_bool()?, "output bool"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_int(out: *mut i64, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.to_int()?, "output int"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_double(out: *mut f64, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.to_double()?, "output double"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_complex(out: *mut Complex64, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_out(out, self::value(value)?.to_complex()?, "output complex"))
}

/// Writes a malloc'd copy; the caller releases it with `free`.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_string(out: *mut *mut c_char, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_c_string(out, self::value(value)?.to_str()?, "output string"))
}

/// Mints a new tensor handle; freeing it never affects the value.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_tensor(out: *mut *mut ctn_tensor, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_handle(out, self::value(value)?.to_tensor()?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_device(out: *mut *mut ctn_device, value: *mut ctn_value) -> *mut c_char {
    try_catch(|| write_handle(out, self::value(value)?.to_device()?))
}

// --- container accessors --------------------------------------------------

fn fill<T: Copy>(
    out: *mut T,
    count: i64,
    value: *mut ctn_value,
    decode: impl FnOnce(&DynamicValue, usize) -> Result<Vec<T>>,
) -> *mut c_char {
    try_catch(|| {
        let expected = check_len(count, "count")?;
        let items = decode(self::value(value)?, expected)?;
        out_slice(out, expected, "output buffer")?.copy_from_slice(&items);
        Ok(())
    })
}

fn fill_handles<T: Resource, V: Into<T>>(
    out: *mut *mut T,
    count: i64,
    value: *mut ctn_value,
    decode: impl FnOnce(&DynamicValue, usize) -> Result<Vec<V>>,
) -> *mut c_char {
    try_catch(|| {
        let expected = check_len(count, "count")?;
        let items = decode(self::value(value)?, expected)?;
        mint_into(out_slice(out, expected, "output buffer")?, items);
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_bool_list(out: *mut bool, count: i64, value: *mut ctn_value) -> *mut c_char {
    fill(out, count, value, DynamicValue::to_bool_list)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_int_list(out: *mut i64, count: i64, value: *mut ctn_value) -> *mut c_char {
    fill(out, count, value, DynamicValue::to_int_list)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_double_list(out: *mut f64, count: i64, value: *mut ctn_value) -> *mut c_char {
    fill(out, count, value, DynamicValue::to_double_list)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_complex_list(out: *mut Complex64, count: i64, value: *mut ctn_value) -> *mut c_char {
    fill(out, count, value, DynamicValue::to_complex_list)
}

/// Each element becomes an independently owned tensor handle.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_tensor_list(
    out: *mut *mut ctn_tensor,
    count: i64,
    value: *mut ctn_value,
) -> *mut c_char {
    fill_handles(out, count, value, DynamicValue::to_tensor_list)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_list(out: *mut *mut ctn_value, count: i64, value: *mut ctn_value) -> *mut c_char {
    fill_handles(out, count, value, DynamicValue::to_list)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_tuple(out: *mut *mut ctn_value, count: i64, value: *mut ctn_value) -> *mut c_char {
    fill_handles(out, count, value, DynamicValue::to_tuple)
}

/// Parallel arrays: `keys[i]` maps to `values[i]`.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_value_to_generic_dict(
    keys: *mut *mut ctn_value,
    values: *mut *mut ctn_value,
    count: i64,
    value: *mut ctn_value,
) -> *mut c_char {
    try_catch(|| {
        let expected = check_len(count, "count")?;
        let (decoded_keys, decoded_values) = self::value(value)?.to_generic_dict(expected)?;
        let key_slots = out_slice(keys, expected, "output keys")?;
        let value_slots = out_slice(values, expected, "output values")?;
        mint_into(key_slots, decoded_keys);
        mint_into(value_slots, decoded_values);
        Ok(())
    })
}
