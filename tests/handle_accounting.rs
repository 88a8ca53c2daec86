// Live-handle counters return to baseline after every documented alloc/free pair.
// Kept to a single test: counters are process-wide and tests in one binary run in parallel.
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use ctensor::abi::buffer::*;
use ctensor::abi::device::*;
use ctensor::abi::functions::*;
use ctensor::abi::handle::{HandleKind, ctn_live_handles, ctn_value};
use ctensor::abi::options::*;
use ctensor::abi::tensor::*;
use ctensor::abi::value::*;

fn ok(diagnostic: *mut c_char) {
    assert!(diagnostic.is_null(), "unexpected diagnostic");
}

fn length_mismatch(diagnostic: *mut c_char) {
    assert!(!diagnostic.is_null(), "expected a diagnostic");
    let text = unsafe { CStr::from_ptr(diagnostic) }.to_string_lossy().into_owned();
    unsafe { libc::free(diagnostic.cast()) };
    assert!(text.starts_with("LengthMismatch"), "{text}");
}

fn live() -> [i64; 6] {
    HandleKind::ALL.map(|kind| ctn_live_handles(kind as i32))
}

#[test]
fn every_mint_is_matched_by_one_release() {
    let baseline = live();
    assert_eq!(baseline, [0; 6]);

    let cpu = CString::new("cpu").expect("cstring");
    let mut device = ptr::null_mut();
    ok(ctn_device_new(&mut device, cpu.as_ptr()));

    let mut defaults = ptr::null_mut();
    ok(ctn_tensor_options_new(&mut defaults));
    let mut doubles = ptr::null_mut();
    ok(ctn_tensor_options_dtype(&mut doubles, defaults, 7));
    let mut placed = ptr::null_mut();
    ok(ctn_tensor_options_device(&mut placed, doubles, device));

    let size = [2i64, 2];
    let mut ones = ptr::null_mut();
    ok(ctn_ones(&mut ones, size.as_ptr(), 2, placed));
    let mut buffer = ptr::null_mut();
    ok(ctn_tensor_encode(&mut buffer, ones));

    let mut list = ptr::null_mut();
    ok(ctn_value_from_tensor_list(&mut list, [ones, ones].as_ptr(), 2));
    let mut dict = ptr::null_mut();
    let mut key = ptr::null_mut();
    ok(ctn_value_from_int(&mut key, 1));
    ok(ctn_value_from_generic_dict(&mut dict, [key].as_ptr(), [list].as_ptr(), 1));

    assert_eq!(live(), [1, 1, 3, 1, 0, 3]);

    // Extraction mints new handles and leaves the container intact.
    let mut tensors = [ptr::null_mut(); 2];
    ok(ctn_value_to_tensor_list(tensors.as_mut_ptr(), 2, list));
    let mut keys = [ptr::null_mut(); 1];
    let mut values = [ptr::null_mut(); 1];
    ok(ctn_value_to_generic_dict(keys.as_mut_ptr(), values.as_mut_ptr(), 1, dict));
    assert_eq!(live(), [3, 1, 3, 1, 0, 5]);

    // Failed calls mint nothing.
    let bad = CString::new("tpu").expect("cstring");
    let mut unused = ptr::null_mut();
    let diagnostic = ctn_device_new(&mut unused, bad.as_ptr());
    assert!(!diagnostic.is_null());
    unsafe { libc::free(diagnostic.cast()) };
    let mut three = [ptr::null_mut(); 3];
    let diagnostic = ctn_value_to_tensor_list(three.as_mut_ptr(), 3, list);
    assert!(!diagnostic.is_null());
    unsafe { libc::free(diagnostic.cast()) };
    assert_eq!(live(), [3, 1, 3, 1, 0, 5]);

    // Wrong lengths on the handle-minting accessors write no slot and mint nothing.
    let mut tuple = ptr::null_mut();
    ok(ctn_value_from_tuple(&mut tuple, [key, list].as_ptr(), 2));
    let before = live();
    let sentinel = ptr::dangling_mut::<ctn_value>();
    for declared in [1i64, 3] {
        let mut slots = [sentinel; 4];
        length_mismatch(ctn_value_to_list(slots.as_mut_ptr(), declared, list));
        length_mismatch(ctn_value_to_tuple(slots.as_mut_ptr(), declared, tuple));
        assert!(slots.iter().all(|&slot| slot == sentinel), "declared {declared}");
    }
    for declared in [0i64, 2] {
        let mut dict_keys = [sentinel; 4];
        let mut dict_values = [sentinel; 4];
        length_mismatch(ctn_value_to_generic_dict(
            dict_keys.as_mut_ptr(),
            dict_values.as_mut_ptr(),
            declared,
            dict,
        ));
        assert!(
            dict_keys.iter().chain(&dict_values).all(|&slot| slot == sentinel),
            "declared {declared}"
        );
    }
    assert_eq!(live(), before);
    ctn_value_free(tuple);

    for tensor in tensors {
        ctn_tensor_free(tensor);
    }
    ctn_value_free(keys[0]);
    ctn_value_free(values[0]);
    ctn_value_free(dict);
    ctn_value_free(key);
    ctn_value_free(list);
    ctn_byte_buffer_free(buffer);
    ctn_tensor_free(ones);
    ctn_tensor_options_free(placed);
    ctn_tensor_options_free(doubles);
    ctn_tensor_options_free(defaults);
    ctn_device_free(device);

    // Null frees are no-ops.
    ctn_tensor_free(ptr::null_mut());
    ctn_value_free(ptr::null_mut());

    assert_eq!(live(), baseline);
}
