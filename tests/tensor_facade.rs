// Tensor and functional facades: views, in-place mutation, promotion, grad mode.
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use ctensor::abi::functions::*;
use ctensor::abi::handle::{ctn_tensor, ctn_tensor_options};
use ctensor::abi::options::*;
use ctensor::abi::runtime::*;
use ctensor::abi::tensor::*;
use ctensor::core::dtype::Dtype;

fn ok(diagnostic: *mut c_char) {
    if !diagnostic.is_null() {
        panic!("unexpected diagnostic: {}", take(diagnostic));
    }
}

fn take(text: *mut c_char) -> String {
    assert!(!text.is_null(), "expected a string");
    let owned = unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned();
    unsafe { libc::free(text.cast()) };
    owned
}

fn options(dtype: Dtype) -> *mut ctn_tensor_options {
    let mut defaults = ptr::null_mut();
    ok(ctn_tensor_options_new(&mut defaults));
    let mut typed = ptr::null_mut();
    ok(ctn_tensor_options_dtype(&mut typed, defaults, dtype.code()));
    ctn_tensor_options_free(defaults);
    typed
}

fn arange(end: f64, dtype: Dtype) -> *mut ctn_tensor {
    let options = options(dtype);
    let mut tensor = ptr::null_mut();
    ok(ctn_arange(&mut tensor, 0.0, end, 1.0, options));
    ctn_tensor_options_free(options);
    tensor
}

fn dtype_of(tensor: *mut ctn_tensor) -> i8 {
    let mut dtype = -1i8;
    ok(ctn_tensor_dtype(&mut dtype, tensor));
    dtype
}

fn shape_of(tensor: *mut ctn_tensor) -> Vec<i64> {
    let mut dim = 0i64;
    ok(ctn_tensor_dim(&mut dim, tensor));
    let mut shape = vec![0i64; dim as usize];
    ok(ctn_tensor_shape(shape.as_mut_ptr(), dim, tensor));
    shape
}

fn render(tensor: *mut ctn_tensor) -> String {
    let mut text = ptr::null_mut();
    ok(ctn_tensor_string(&mut text, tensor));
    take(text)
}

fn item_f64(tensor: *mut ctn_tensor) -> f64 {
    let mut value = 0f64;
    ok(ctn_tensor_item_f64(&mut value, tensor));
    value
}

#[test]
fn views_share_storage_with_their_source() {
    let base = arange(6.0, Dtype::Float);
    let size = [2i64, 3];
    let mut view = ptr::null_mut();
    ok(ctn_tensor_view(&mut view, base, size.as_ptr(), 2));
    let mut detached = ptr::null_mut();
    ok(ctn_tensor_detach(&mut detached, view));
    let mut copy = ptr::null_mut();
    ok(ctn_tensor_clone(&mut copy, base));

    let ones_options = options(Dtype::Float);
    let mut ones = ptr::null_mut();
    ok(ctn_ones(&mut ones, [3i64].as_ptr(), 1, ones_options));
    ok(ctn_add_(view, ones, 10.0));

    assert_eq!(render(base), "tensor([10.0000, 11.0000, 12.0000, 13.0000, 14.0000, 15.0000], dtype=float32)");
    assert_eq!(shape_of(detached), vec![2, 3]);
    let mut total = ptr::null_mut();
    ok(ctn_sum(&mut total, detached));
    assert_eq!(item_f64(total), 75.0);
    let mut untouched = ptr::null_mut();
    ok(ctn_sum(&mut untouched, copy));
    assert_eq!(item_f64(untouched), 15.0);

    for tensor in [base, view, detached, copy, ones, total, untouched] {
        ctn_tensor_free(tensor);
    }
    ctn_tensor_options_free(ones_options);
}

#[test]
fn arithmetic_promotes_by_category() {
    let ints = arange(4.0, Dtype::Long);
    let floats = arange(4.0, Dtype::Float);

    let mut sum = ptr::null_mut();
    ok(ctn_add(&mut sum, ints, floats, 1.0));
    assert_eq!(dtype_of(sum), Dtype::Float.code());

    let mut quotient = ptr::null_mut();
    ok(ctn_div(&mut quotient, ints, ints));
    assert_eq!(dtype_of(quotient), Dtype::Float.code());

    let text = take(ctn_add_(ints, floats, 1.0));
    assert!(text.starts_with("Compute"), "{text}");

    let text = take(ctn_add(&mut sum, ints, ints, 0.5));
    assert!(text.contains("alpha must not be a floating point"), "{text}");

    for tensor in [ints, floats, sum, quotient] {
        ctn_tensor_free(tensor);
    }
}

#[test]
fn matrix_product_checks_inner_dimensions() {
    let flat = arange(6.0, Dtype::Double);
    let mut matrix = ptr::null_mut();
    ok(ctn_tensor_reshape(&mut matrix, flat, [2i64, 3].as_ptr(), 2));
    let mut out: *mut ctn_tensor = ptr::dangling_mut();
    let text = take(ctn_mm(&mut out, matrix, matrix));
    assert!(text.contains("mat1 and mat2 shapes cannot be multiplied (2x3 and 2x3)"), "{text}");
    assert_eq!(out, ptr::dangling_mut());

    let mut transposed = ptr::null_mut();
    ok(ctn_transpose(&mut transposed, matrix, 0, 1));
    let mut gram = ptr::null_mut();
    ok(ctn_mm(&mut gram, matrix, transposed));
    assert_eq!(shape_of(gram), vec![2, 2]);
    let mut total = ptr::null_mut();
    ok(ctn_sum(&mut total, gram));
    // [[5, 14], [14, 50]]
    assert_eq!(item_f64(total), 83.0);

    for tensor in [flat, matrix, transposed, gram, total] {
        ctn_tensor_free(tensor);
    }
}

#[test]
fn shape_functions_compose() {
    let a = arange(3.0, Dtype::Long);
    let b = arange(3.0, Dtype::Long);
    let mut stacked = ptr::null_mut();
    ok(ctn_stack(&mut stacked, [a, b].as_ptr(), 2, 0));
    assert_eq!(shape_of(stacked), vec![2, 3]);
    let mut joined = ptr::null_mut();
    ok(ctn_cat(&mut joined, [a, b].as_ptr(), 2, 0));
    assert_eq!(shape_of(joined), vec![6]);

    let mut lifted = ptr::null_mut();
    ok(ctn_unsqueeze(&mut lifted, stacked, 0));
    assert_eq!(shape_of(lifted), vec![1, 2, 3]);
    let mut permuted = ptr::null_mut();
    ok(ctn_permute(&mut permuted, lifted, [2i64, 0, 1].as_ptr(), 3));
    assert_eq!(shape_of(permuted), vec![3, 1, 2]);
    let mut squeezed = ptr::null_mut();
    ok(ctn_squeeze(&mut squeezed, permuted));
    assert_eq!(shape_of(squeezed), vec![3, 2]);
    let mut flat = ptr::null_mut();
    ok(ctn_flatten(&mut flat, squeezed, 0, -1));
    assert_eq!(shape_of(flat), vec![6]);

    let mut same = false;
    ok(ctn_equal(&mut same, a, b));
    assert!(same);
    let mut close = false;
    ok(ctn_allclose(&mut close, a, b, 1e-5, 1e-8, false));
    assert!(close);

    let text = take(ctn_cat(&mut joined, ptr::null(), 0, 0));
    assert!(!text.is_empty());

    for tensor in [a, b, stacked, joined, lifted, permuted, squeezed, flat] {
        ctn_tensor_free(tensor);
    }
}

#[test]
fn seeded_generators_repeat() {
    let options = options(Dtype::Double);
    let size = [4i64];
    let mut first = ptr::null_mut();
    let mut second = ptr::null_mut();
    ctn_manual_seed(42);
    ok(ctn_randn(&mut first, size.as_ptr(), 1, options));
    ctn_manual_seed(42);
    ok(ctn_randn(&mut second, size.as_ptr(), 1, options));
    let mut same = false;
    ok(ctn_equal(&mut same, first, second));
    assert!(same);

    let mut ints = ptr::null_mut();
    ok(ctn_randint_like(&mut ints, first, 3, 5));
    let mut low = ptr::null_mut();
    ok(ctn_min(&mut low, ints));
    assert!(item_f64(low) >= 3.0);
    let mut high = ptr::null_mut();
    ok(ctn_max(&mut high, ints));
    assert!(item_f64(high) < 5.0);

    for tensor in [first, second, ints, low, high] {
        ctn_tensor_free(tensor);
    }
    ctn_tensor_options_free(options);
}

#[test]
fn grad_mode_controls_result_flags() {
    let options = options(Dtype::Float);
    let mut tracked_options = ptr::null_mut();
    ok(ctn_tensor_options_requires_grad(&mut tracked_options, options, true));
    let mut tracked = ptr::null_mut();
    ok(ctn_ones(&mut tracked, [2i64].as_ptr(), 1, tracked_options));

    let mut flag = false;
    let mut result = ptr::null_mut();
    ok(ctn_sigmoid(&mut result, tracked));
    ok(ctn_tensor_requires_grad(&mut flag, result));
    assert!(flag);
    ctn_tensor_free(result);

    ctn_set_grad_enabled(false);
    assert!(!ctn_is_grad_enabled());
    ok(ctn_sigmoid(&mut result, tracked));
    ok(ctn_tensor_requires_grad(&mut flag, result));
    assert!(!flag);
    ctn_set_grad_enabled(true);
    ctn_tensor_free(result);

    let text = take(ctn_tensor_backward(tracked));
    assert!(text.starts_with("Unsupported"), "{text}");

    let long_options = options_with_dtype(options, Dtype::Long);
    let mut bad = ptr::null_mut();
    ok(ctn_tensor_options_requires_grad(&mut bad, long_options, true));
    let mut never: *mut ctn_tensor = ptr::dangling_mut();
    let text = take(ctn_zeros(&mut never, [1i64].as_ptr(), 1, bad));
    assert!(text.starts_with("Construction"), "{text}");
    assert_eq!(never, ptr::dangling_mut());

    ctn_tensor_free(tracked);
    for handle in [options, tracked_options, long_options, bad] {
        ctn_tensor_options_free(handle);
    }
}

fn options_with_dtype(base: *mut ctn_tensor_options, dtype: Dtype) -> *mut ctn_tensor_options {
    let mut out = ptr::null_mut();
    ok(ctn_tensor_options_dtype(&mut out, base, dtype.code()));
    out
}

#[test]
fn unallocatable_tensors_return_a_diagnostic() {
    let options = options(Dtype::Float);
    let mut out: *mut ctn_tensor = ptr::dangling_mut();

    // Representable, but far beyond any address space.
    let huge = [1i64 << 40, 1 << 10];
    let text = take(ctn_zeros(&mut out, huge.as_ptr(), 2, options));
    assert!(text.starts_with("Compute: can't allocate memory"), "{text}");
    let text = take(ctn_full(&mut out, huge.as_ptr(), 2, 3.0, options));
    assert!(text.starts_with("Compute: can't allocate memory"), "{text}");
    let text = take(ctn_rand(&mut out, huge.as_ptr(), 2, options));
    assert!(text.starts_with("Compute: can't allocate memory"), "{text}");
    assert_eq!(out, ptr::dangling_mut());

    let wrapping = [1i64 << 62];
    let text = take(ctn_ones(&mut out, wrapping.as_ptr(), 1, options));
    assert!(text.starts_with("Construction"), "{text}");
    let text = take(ctn_eye(&mut out, 1 << 40, 1 << 40, options));
    assert!(text.contains("is too large"), "{text}");
    assert_eq!(out, ptr::dangling_mut());

    let mut small = ptr::null_mut();
    ok(ctn_eye(&mut small, 2, 3, options));
    let mut total = ptr::null_mut();
    ok(ctn_sum(&mut total, small));
    assert_eq!(item_f64(total), 2.0);
    ctn_tensor_free(total);
    ctn_tensor_free(small);
    ctn_tensor_options_free(options);
}

#[test]
fn unavailable_devices_fail_as_compute() {
    let cuda = CString::new("cuda").expect("cstring");
    let mut device = ptr::null_mut();
    ok(ctensor::abi::device::ctn_device_new(&mut device, cuda.as_ptr()));
    let tensor = arange(2.0, Dtype::Float);
    let mut moved: *mut ctn_tensor = ptr::dangling_mut();
    let text = take(ctn_tensor_copy_to(&mut moved, tensor, device));
    assert!(text.starts_with("Compute: device unavailable"), "{text}");
    assert_eq!(moved, ptr::dangling_mut());
    ctn_tensor_free(tensor);
    ctensor::abi::device::ctn_device_free(device);
}
