//! Purpose: Functional facade: tensor creation, elementwise math, reductions, comparisons, shape ops.
//! Exports: `ctn_*` free functions that take tensor handles and mint new ones.
//! Role: Same borrow/compute/mint pattern as the tensor facade, over `core::ops`.
//! Invariants: Functions ending in `_` mutate their first tensor in place and mint nothing.
use std::os::raw::c_char;

use crate::abi::diagnostic::try_catch;
use crate::abi::handle::{borrow, borrow_all, ctn_tensor, ctn_tensor_options, slice_arg, write_handle, write_out};
use crate::core::dtype::Scalar;
use crate::core::error::Result;
use crate::core::ops::{self, BinaryOp, UnaryOp};
use crate::core::options::TensorOptions;
use crate::core::tensor::Tensor;

fn tensor<'a>(raw: *mut ctn_tensor) -> Result<&'a Tensor> {
    Ok(&borrow(raw)?.tensor)
}

fn options(raw: *mut ctn_tensor_options) -> Result<TensorOptions> {
    Ok(borrow(raw)?.options)
}

fn tensors(items: *const *mut ctn_tensor, count: i64) -> Result<Vec<Tensor>> {
    Ok(borrow_all(items, count, "tensors")?
        .into_iter()
        .map(|handle| handle.tensor.clone())
        .collect())
}

fn create(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    options: *mut ctn_tensor_options,
    build: impl FnOnce(&[i64], &TensorOptions) -> Result<Tensor>,
) -> *mut c_char {
    try_catch(|| {
        let size = slice_arg(size, len, "size")?;
        let options = self::options(options)?;
        write_handle(out, build(size, &options)?)
    })
}

fn like(
    out: *mut *mut ctn_tensor,
    reference: *mut ctn_tensor,
    build: impl FnOnce(&Tensor) -> Result<Tensor>,
) -> *mut c_char {
    try_catch(|| write_handle(out, build(tensor(reference)?)?))
}

// --- creation -------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ctn_zeros(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    create(out, size, len, options, Tensor::zeros)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_ones(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    create(out, size, len, options, Tensor::ones)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_empty(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    create(out, size, len, options, ops::empty)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_full(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    value: f64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    create(out, size, len, options, |size, options| {
        Tensor::full(size, Scalar::Float(value), options)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_rand(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    create(out, size, len, options, ops::rand)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_randn(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    create(out, size, len, options, ops::randn)
}

/// Integers drawn uniformly from `[low, high)`.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_randint(
    out: *mut *mut ctn_tensor,
    size: *const i64,
    len: i64,
    low: i64,
    high: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    create(out, size, len, options, |size, options| ops::randint(size, low, high, options))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_arange(
    out: *mut *mut ctn_tensor,
    start: f64,
    end: f64,
    step: f64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    try_catch(|| write_handle(out, ops::arange(start, end, step, &self::options(options)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_linspace(
    out: *mut *mut ctn_tensor,
    start: f64,
    end: f64,
    steps: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    try_catch(|| write_handle(out, ops::linspace(start, end, steps, &self::options(options)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_eye(
    out: *mut *mut ctn_tensor,
    n: i64,
    m: i64,
    options: *mut ctn_tensor_options,
) -> *mut c_char {
    try_catch(|| write_handle(out, ops::eye(n, m, &self::options(options)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_zeros_like(out: *mut *mut ctn_tensor, reference: *mut ctn_tensor) -> *mut c_char {
    like(out, reference, ops::zeros_like)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_ones_like(out: *mut *mut ctn_tensor, reference: *mut ctn_tensor) -> *mut c_char {
    like(out, reference, ops::ones_like)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_empty_like(out: *mut *mut ctn_tensor, reference: *mut ctn_tensor) -> *mut c_char {
    like(out, reference, ops::zeros_like)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_full_like(out: *mut *mut ctn_tensor, reference: *mut ctn_tensor, value: f64) -> *mut c_char {
    like(out, reference, |reference| ops::full_like(reference, Scalar::Float(value)))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_rand_like(out: *mut *mut ctn_tensor, reference: *mut ctn_tensor) -> *mut c_char {
    like(out, reference, ops::rand_like)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_randn_like(out: *mut *mut ctn_tensor, reference: *mut ctn_tensor) -> *mut c_char {
    like(out, reference, ops::randn_like)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_randint_like(
    out: *mut *mut ctn_tensor,
    reference: *mut ctn_tensor,
    low: i64,
    high: i64,
) -> *mut c_char {
    like(out, reference, |reference| {
        ops::randint(reference.shape(), low, high, &reference.options())
    })
}

// --- elementwise ----------------------------------------------------------

fn binary(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, b: *mut ctn_tensor, op: BinaryOp, alpha: f64) -> *mut c_char {
    try_catch(|| write_handle(out, ops::binary(op, tensor(a)?, tensor(b)?, alpha)?))
}

fn binary_in_place(a: *mut ctn_tensor, b: *mut ctn_tensor, op: BinaryOp, alpha: f64) -> *mut c_char {
    try_catch(|| ops::binary_in_place(op, tensor(a)?, tensor(b)?, alpha))
}

/// `a + alpha * b`.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_add(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, b: *mut ctn_tensor, alpha: f64) -> *mut c_char {
    binary(out, a, b, BinaryOp::Add, alpha)
}

/// `a - alpha * b`.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_sub(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, b: *mut ctn_tensor, alpha: f64) -> *mut c_char {
    binary(out, a, b, BinaryOp::Sub, alpha)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_mul(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, b: *mut ctn_tensor) -> *mut c_char {
    binary(out, a, b, BinaryOp::Mul, 1.0)
}

/// True division; integer inputs produce a float32 result.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_div(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, b: *mut ctn_tensor) -> *mut c_char {
    binary(out, a, b, BinaryOp::Div, 1.0)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_add_(a: *mut ctn_tensor, b: *mut ctn_tensor, alpha: f64) -> *mut c_char {
    binary_in_place(a, b, BinaryOp::Add, alpha)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_sub_(a: *mut ctn_tensor, b: *mut ctn_tensor, alpha: f64) -> *mut c_char {
    binary_in_place(a, b, BinaryOp::Sub, alpha)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_mul_(a: *mut ctn_tensor, b: *mut ctn_tensor) -> *mut c_char {
    binary_in_place(a, b, BinaryOp::Mul, 1.0)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_div_(a: *mut ctn_tensor, b: *mut ctn_tensor) -> *mut c_char {
    binary_in_place(a, b, BinaryOp::Div, 1.0)
}

fn unary(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, op: UnaryOp) -> *mut c_char {
    try_catch(|| write_handle(out, ops::unary(op, tensor(a)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_abs(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Abs)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_neg(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Neg)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_sqrt(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Sqrt)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_exp(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Exp)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_log(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Log)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_sigmoid(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Sigmoid)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_tanh(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Tanh)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_relu(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    unary(out, a, UnaryOp::Relu)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_abs_(a: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| ops::unary_in_place(UnaryOp::Abs, tensor(a)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_sqrt_(a: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| ops::unary_in_place(UnaryOp::Sqrt, tensor(a)?))
}

// --- reductions -----------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ctn_sum(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, ops::sum(tensor(a)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_sum_dim(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, dim: i64, keep_dim: bool) -> *mut c_char {
    try_catch(|| write_handle(out, ops::sum_dim(tensor(a)?, dim, keep_dim)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_mean(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, ops::mean(tensor(a)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_mean_dim(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, dim: i64, keep_dim: bool) -> *mut c_char {
    try_catch(|| write_handle(out, ops::mean_dim(tensor(a)?, dim, keep_dim)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_max(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, ops::max(tensor(a)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_min(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, ops::min(tensor(a)?)?))
}

// --- comparison -----------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ctn_eq(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, b: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, ops::eq(tensor(a)?, tensor(b)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_equal(out: *mut bool, a: *mut ctn_tensor, b: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_out(out, ops::equal(tensor(a)?, tensor(b)?)?, "output flag"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_allclose(
    out: *mut bool,
    a: *mut ctn_tensor,
    b: *mut ctn_tensor,
    rtol: f64,
    atol: f64,
    equal_nan: bool,
) -> *mut c_char {
    try_catch(|| {
        let close = ops::allclose(tensor(a)?, tensor(b)?, rtol, atol, equal_nan)?;
        write_out(out, close, "output flag")
    })
}

// --- shape ----------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ctn_cat(
    out: *mut *mut ctn_tensor,
    items: *const *mut ctn_tensor,
    count: i64,
    dim: i64,
) -> *mut c_char {
    try_catch(|| write_handle(out, ops::cat(&tensors(items, count)?, dim)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_stack(
    out: *mut *mut ctn_tensor,
    items: *const *mut ctn_tensor,
    count: i64,
    dim: i64,
) -> *mut c_char {
    try_catch(|| write_handle(out, ops::stack(&tensors(items, count)?, dim)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_transpose(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, dim0: i64, dim1: i64) -> *mut c_char {
    try_catch(|| write_handle(out, ops::transpose(tensor(a)?, dim0, dim1)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_permute(
    out: *mut *mut ctn_tensor,
    a: *mut ctn_tensor,
    dims: *const i64,
    len: i64,
) -> *mut c_char {
    try_catch(|| {
        let dims = slice_arg(dims, len, "dims")?;
        write_handle(out, ops::permute(tensor(a)?, dims)?)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_flatten(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, start_dim: i64, end_dim: i64) -> *mut c_char {
    try_catch(|| write_handle(out, ops::flatten(tensor(a)?, start_dim, end_dim)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_squeeze(out: *mut *mut ctn_tensor, a: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, ops::squeeze(tensor(a)?)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_squeeze_dim(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, dim: i64) -> *mut c_char {
    try_catch(|| write_handle(out, ops::squeeze_dim(tensor(a)?, dim)?))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_unsqueeze(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, dim: i64) -> *mut c_char {
    try_catch(|| write_handle(out, ops::unsqueeze(tensor(a)?, dim)?))
}

// --- linear algebra -------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn ctn_mm(out: *mut *mut ctn_tensor, a: *mut ctn_tensor, b: *mut ctn_tensor) -> *mut c_char {
    try_catch(|| write_handle(out, ops::mm(tensor(a)?, tensor(b)?)?))
}
