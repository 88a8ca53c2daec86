//! Purpose: Compiled module facade: load, persist, switch modes, run forward.
//! Exports: `ctn_module_*` functions.
//! Role: Mode and placement setters mutate the module behind the handle; forward mints a value handle.
use std::os::raw::c_char;
use std::path::Path;

use crate::abi::diagnostic::try_catch;
use crate::abi::handle::{
    self, borrow, borrow_all, borrow_mut, ctn_device, ctn_module, ctn_value, str_arg, write_c_string, write_handle,
    write_out,
};
use crate::core::device::Device;
use crate::core::dtype::Dtype;
use crate::core::module::CompiledModule;
use crate::core::value::DynamicValue;

/// A null `device` loads onto the CPU.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_load(
    out: *mut *mut ctn_module,
    path: *const c_char,
    device: *mut ctn_device,
) -> *mut c_char {
    try_catch(|| {
        let path = str_arg(path, "path")?;
        let device = if device.is_null() {
            Device::CPU
        } else {
            borrow(device)?.device
        };
        write_handle(out, CompiledModule::load(Path::new(path), device)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_free(module: *mut ctn_module) {
    handle::free(module);
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_save(path: *const c_char, module: *mut ctn_module) -> *mut c_char {
    try_catch(|| {
        let path = str_arg(path, "path")?;
        borrow(module)?.module.save(Path::new(path))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_string(out: *mut *mut c_char, module: *mut ctn_module) -> *mut c_char {
    try_catch(|| write_c_string(out, &borrow(module)?.module.to_string(), "output string"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_is_training(out: *mut bool, module: *mut ctn_module) -> *mut c_char {
    try_catch(|| write_out(out, borrow(module)?.module.is_training(), "output flag"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_is_optimized(out: *mut bool, module: *mut ctn_module) -> *mut c_char {
    try_catch(|| write_out(out, borrow(module)?.module.is_optimized(), "output flag"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_set_optimized(module: *mut ctn_module, optimized: bool) -> *mut c_char {
    try_catch(|| {
        borrow_mut(module)?.module.set_optimized(optimized);
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_train(module: *mut ctn_module, mode: bool) -> *mut c_char {
    try_catch(|| {
        borrow_mut(module)?.module.train(mode);
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_eval(module: *mut ctn_module) -> *mut c_char {
    try_catch(|| {
        borrow_mut(module)?.module.eval();
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_cast_to(module: *mut ctn_module, dtype: i8) -> *mut c_char {
    try_catch(|| {
        let dtype = Dtype::from_code(dtype)?;
        borrow_mut(module)?.module.cast_to(dtype)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_copy_to(module: *mut ctn_module, device: *mut ctn_device) -> *mut c_char {
    try_catch(|| {
        let device = borrow(device)?.device;
        borrow_mut(module)?.module.copy_to(device);
        Ok(())
    })
}

/// Runs the forward pipeline over `count` borrowed input values.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_module_forward(
    out: *mut *mut ctn_value,
    module: *mut ctn_module,
    inputs: *const *mut ctn_value,
    count: i64,
) -> *mut c_char {
    try_catch(|| {
        let module = &borrow(module)?.module;
        let inputs: Vec<DynamicValue> = borrow_all(inputs, count, "inputs")?
            .into_iter()
            .map(|handle| handle.value.clone())
            .collect();
        write_handle(out, module.forward(&inputs)?)
    })
}
