//! Purpose: Reference CPU kernels behind the functional facade.
//! Exports: creation, elementwise, reduction, comparison, shape and matmul operations.
//! Role: Stand-in compute engine; the boundary layer only forwards to these.
//! Invariants: Binary ops broadcast numpy-style and promote by category, then width.
//! Invariants: In-place ops (`*_`) never change the mutated tensor's shape or dtype.
use crate::config;
use crate::core::dtype::{Category, Complex64, Dtype, Scalar};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::options::TensorOptions;
use crate::core::random;
use crate::core::shape;
use crate::core::tensor::{Tensor, try_buffer, try_collect};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Abs,
    Neg,
    Sqrt,
    Exp,
    Log,
    Sigmoid,
    Tanh,
    Relu,
}

// --- creation -------------------------------------------------------------

pub fn empty(shape: &[i64], options: &TensorOptions) -> Result<Tensor> {
    Tensor::zeros(shape, options)
}

pub fn arange(start: f64, end: f64, step: f64, options: &TensorOptions) -> Result<Tensor> {
    if step == 0.0 {
        return Err(Error::new(ErrorKind::Construction).with_message("arange: step must be nonzero"));
    }
    if (step > 0.0 && end < start) || (step < 0.0 && end > start) {
        return Err(Error::new(ErrorKind::Construction)
            .with_message("arange: upper bound and lower bound inconsistent with step sign"));
    }
    let span = ((end - start) / step).ceil().max(0.0);
    if !span.is_finite() || span >= i64::MAX as f64 {
        return Err(Error::new(ErrorKind::Construction)
            .with_message(format!("arange: invalid size, possible overflow for [{start}, {end}) with step {step}")));
    }
    let count = span as usize;
    shape::storage_bytes(&[count as i64], options.dtype.element_size())?;
    let values = try_collect(count, (0..count).map(|i| Scalar::Float(start + i as f64 * step)))?;
    Tensor::from_scalars(&values, &[count as i64], options)
}

pub fn linspace(start: f64, end: f64, steps: i64, options: &TensorOptions) -> Result<Tensor> {
    if steps < 0 {
        return Err(Error::new(ErrorKind::Construction)
            .with_message("linspace: number of steps must be non-negative"));
    }
    shape::storage_bytes(&[steps], options.dtype.element_size())?;
    let values = match steps {
        0 => Vec::new(),
        1 => vec![Scalar::Float(start)],
        n => {
            let delta = (end - start) / (n - 1) as f64;
            try_collect(n as usize, (0..n).map(|i| Scalar::Float(start + i as f64 * delta)))?
        }
    };
    Tensor::from_scalars(&values, &[steps], options)
}

pub fn eye(n: i64, m: i64, options: &TensorOptions) -> Result<Tensor> {
    if n < 0 || m < 0 {
        return Err(Error::new(ErrorKind::Construction)
            .with_message(format!("eye: n and m must be non-negative, got {n} and {m}")));
    }
    let out = Tensor::zeros(&[n, m], options)?;
    for i in 0..n.min(m) as usize {
        out.write_element(i * m as usize + i, Scalar::Int(1))?;
    }
    Ok(out)
}

pub fn rand(shape: &[i64], options: &TensorOptions) -> Result<Tensor> {
    require_floating("rand", options.dtype)?;
    let count = checked_count(shape, options.dtype)?;
    let draws = random::uniform(count)?;
    let values = try_collect(count, draws.into_iter().map(Scalar::Float))?;
    Tensor::from_scalars(&values, shape, options)
}

pub fn randn(shape: &[i64], options: &TensorOptions) -> Result<Tensor> {
    require_floating("randn", options.dtype)?;
    let count = checked_count(shape, options.dtype)?;
    let draws = random::normal(count)?;
    let values = try_collect(count, draws.into_iter().map(Scalar::Float))?;
    Tensor::from_scalars(&values, shape, options)
}

pub fn randint(shape: &[i64], low: i64, high: i64, options: &TensorOptions) -> Result<Tensor> {
    if matches!(options.dtype.category(), Category::Bool | Category::Complex) {
        return Err(Error::new(ErrorKind::Compute)
            .with_message(format!("randint is not implemented for {}", options.dtype)));
    }
    let count = checked_count(shape, options.dtype)?;
    let draws = random::integers(count, low, high)?;
    let values = try_collect(count, draws.into_iter().map(Scalar::Int))?;
    Tensor::from_scalars(&values, shape, options)
}

pub fn zeros_like(reference: &Tensor) -> Result<Tensor> {
    Tensor::zeros(reference.shape(), &reference.options())
}

pub fn ones_like(reference: &Tensor) -> Result<Tensor> {
    Tensor::ones(reference.shape(), &reference.options())
}

pub fn full_like(reference: &Tensor, value: Scalar) -> Result<Tensor> {
    Tensor::full(reference.shape(), value, &reference.options())
}

pub fn rand_like(reference: &Tensor) -> Result<Tensor> {
    rand(reference.shape(), &reference.options())
}

pub fn randn_like(reference: &Tensor) -> Result<Tensor> {
    randn(reference.shape(), &reference.options())
}

/// Element count whose storage in `dtype` is addressable.
fn checked_count(shape: &[i64], dtype: Dtype) -> Result<usize> {
    Ok(shape::storage_bytes(shape, dtype.element_size())? / dtype.element_size())
}

fn require_floating(op: &str, dtype: Dtype) -> Result<()> {
    if dtype.is_floating_point() {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Compute)
        .with_message(format!("{op} is only implemented for floating point dtypes, got {dtype}")))
}

// --- elementwise ----------------------------------------------------------

fn binary_result_dtype(op: BinaryOp, a: Dtype, b: Dtype) -> Dtype {
    let promoted = a.promote(b);
    if op == BinaryOp::Div && promoted.category() <= Category::Integer {
        Dtype::Float
    } else {
        promoted
    }
}

fn apply_binary(op: BinaryOp, a: Scalar, b: Scalar, category: Category) -> Result<Scalar> {
    Ok(match category {
        Category::Complex => {
            let (x, y) = (a.as_complex(), b.as_complex());
            Scalar::Complex(match op {
                BinaryOp::Add => Complex64::new(x.re + y.re, x.im + y.im),
                BinaryOp::Sub => Complex64::new(x.re - y.re, x.im - y.im),
                BinaryOp::Mul => Complex64::new(x.re * y.re - x.im * y.im, x.re * y.im + x.im * y.re),
                BinaryOp::Div => {
                    let denom = y.re * y.re + y.im * y.im;
                    Complex64::new(
                        (x.re * y.re + x.im * y.im) / denom,
                        (x.im * y.re - x.re * y.im) / denom,
                    )
                }
            })
        }
        Category::Floating => {
            let (x, y) = (a.as_f64(), b.as_f64());
            Scalar::Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
            })
        }
        Category::Integer => {
            let (x, y) = (a.as_i64(), b.as_i64());
            Scalar::Int(match op {
                BinaryOp::Add => x.wrapping_add(y),
                BinaryOp::Sub => x.wrapping_sub(y),
                BinaryOp::Mul => x.wrapping_mul(y),
                BinaryOp::Div => {
                    return Err(Error::new(ErrorKind::Compute)
                        .with_message("integer true division must produce a floating result"));
                }
            })
        }
        Category::Bool => {
            let (x, y) = (a.as_bool(), b.as_bool());
            Scalar::Bool(match op {
                BinaryOp::Add => x || y,
                BinaryOp::Mul => x && y,
                BinaryOp::Sub => {
                    return Err(Error::new(ErrorKind::Compute).with_message(
                        "subtraction with two bool tensors is not supported, use logical_xor",
                    ));
                }
                BinaryOp::Div => {
                    return Err(Error::new(ErrorKind::Compute)
                        .with_message("division of bool tensors must produce a floating result"));
                }
            })
        }
    })
}

fn scale_by_alpha(value: Scalar, alpha: f64, category: Category) -> Scalar {
    if alpha == 1.0 {
        return value;
    }
    match category {
        Category::Complex => {
            let c = value.as_complex();
            Scalar::Complex(Complex64::new(c.re * alpha, c.im * alpha))
        }
        Category::Floating => Scalar::Float(value.as_f64() * alpha),
        _ => Scalar::Int(value.as_i64().wrapping_mul(alpha as i64)),
    }
}

fn check_alpha(alpha: f64, category: Category) -> Result<()> {
    if category <= Category::Integer && alpha.fract() != 0.0 {
        return Err(Error::new(ErrorKind::Compute).with_message(
            "for integral input tensors, argument alpha must not be a floating point number",
        ));
    }
    if category == Category::Bool && alpha != 1.0 && alpha != 0.0 {
        return Err(Error::new(ErrorKind::Compute)
            .with_message("boolean alpha only supported for boolean results"));
    }
    Ok(())
}

fn compute_binary(op: BinaryOp, a: &Tensor, b: &Tensor, alpha: f64) -> Result<(Vec<Scalar>, Vec<i64>, Dtype)> {
    let out_shape = shape::broadcast_shapes(a.shape(), b.shape())?;
    let dtype = binary_result_dtype(op, a.dtype(), b.dtype());
    let category = dtype.category();
    if matches!(op, BinaryOp::Add | BinaryOp::Sub) {
        check_alpha(alpha, category)?;
    }
    let lhs = a.broadcast_values(&out_shape)?;
    let rhs = b.broadcast_values(&out_shape)?;
    let mut values = try_buffer(lhs.len())?;
    for (x, y) in lhs.into_iter().zip(rhs) {
        values.push(apply_binary(op, x, scale_by_alpha(y, alpha, category), category)?);
    }
    Ok((values, out_shape, dtype))
}

fn finish(inputs: &[&Tensor], values: &[Scalar], shape: &[i64], dtype: Dtype) -> Result<Tensor> {
    for input in inputs {
        input.device().ensure_available()?;
    }
    let mut out = inputs[0].derived(values, shape, dtype)?;
    let wants_grad = config::is_grad_enabled()
        && inputs.iter().any(|t| t.requires_grad())
        && (dtype.is_floating_point() || dtype.is_complex());
    out.set_requires_grad(wants_grad)?;
    Ok(out)
}

pub fn binary(op: BinaryOp, a: &Tensor, b: &Tensor, alpha: f64) -> Result<Tensor> {
    let (values, shape, dtype) = compute_binary(op, a, b, alpha)?;
    finish(&[a, b], &values, &shape, dtype)
}

pub fn add(a: &Tensor, b: &Tensor, alpha: f64) -> Result<Tensor> {
    binary(BinaryOp::Add, a, b, alpha)
}

pub fn sub(a: &Tensor, b: &Tensor, alpha: f64) -> Result<Tensor> {
    binary(BinaryOp::Sub, a, b, alpha)
}

pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    binary(BinaryOp::Mul, a, b, 1.0)
}

pub fn div(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    binary(BinaryOp::Div, a, b, 1.0)
}

/// Whether values of `from` may be stored into `to` without losing their category.
pub fn can_cast(from: Dtype, to: Dtype) -> bool {
    from.category() <= to.category()
}

pub fn binary_in_place(op: BinaryOp, target: &Tensor, other: &Tensor, alpha: f64) -> Result<()> {
    let (values, shape, dtype) = compute_binary(op, target, other, alpha)?;
    store_in_place(target, &values, &shape, dtype)
}

fn store_in_place(target: &Tensor, values: &[Scalar], shape: &[i64], dtype: Dtype) -> Result<()> {
    if shape != target.shape() {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "output with shape {:?} doesn't match the broadcast shape {shape:?}",
            target.shape()
        )));
    }
    if !can_cast(dtype, target.dtype()) {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "result type {dtype} can't be cast to the desired output type {}",
            target.dtype()
        )));
    }
    target.write_scalars(values)
}

fn unary_result_dtype(op: UnaryOp, dtype: Dtype) -> Result<Dtype> {
    match op {
        UnaryOp::Neg if dtype == Dtype::Bool => Err(Error::new(ErrorKind::Compute)
            .with_message("negation on a bool tensor is not supported, use logical_not")),
        UnaryOp::Abs => Ok(match dtype {
            Dtype::ComplexFloat => Dtype::Float,
            Dtype::ComplexDouble => Dtype::Double,
            other => other,
        }),
        UnaryOp::Relu if dtype.is_complex() => {
            Err(Error::unsupported("relu is not implemented for complex tensors"))
        }
        UnaryOp::Neg | UnaryOp::Relu => Ok(dtype),
        _ if dtype.is_complex() => Err(Error::unsupported(format!(
            "{op:?} is not implemented for complex tensors in the reference engine"
        ))),
        _ if dtype.category() <= Category::Integer => Ok(Dtype::Float),
        _ => Ok(dtype),
    }
}

fn apply_unary(op: UnaryOp, value: Scalar) -> Scalar {
    match (op, value) {
        (UnaryOp::Abs, Scalar::Complex(c)) => Scalar::Float(c.re.hypot(c.im)),
        (UnaryOp::Abs, Scalar::Int(v)) => Scalar::Int(v.wrapping_abs()),
        (UnaryOp::Abs, Scalar::Bool(v)) => Scalar::Bool(v),
        (UnaryOp::Abs, other) => Scalar::Float(other.as_f64().abs()),
        (UnaryOp::Neg, Scalar::Complex(c)) => Scalar::Complex(Complex64::new(-c.re, -c.im)),
        (UnaryOp::Neg, Scalar::Int(v)) => Scalar::Int(v.wrapping_neg()),
        (UnaryOp::Neg, other) => Scalar::Float(-other.as_f64()),
        (UnaryOp::Relu, Scalar::Int(v)) => Scalar::Int(v.max(0)),
        (UnaryOp::Relu, Scalar::Bool(v)) => Scalar::Bool(v),
        (UnaryOp::Relu, other) => Scalar::Float(other.as_f64().max(0.0)),
        (UnaryOp::Sqrt, v) => Scalar::Float(v.as_f64().sqrt()),
        (UnaryOp::Exp, v) => Scalar::Float(v.as_f64().exp()),
        (UnaryOp::Log, v) => Scalar::Float(v.as_f64().ln()),
        (UnaryOp::Sigmoid, v) => Scalar::Float(1.0 / (1.0 + (-v.as_f64()).exp())),
        (UnaryOp::Tanh, v) => Scalar::Float(v.as_f64().tanh()),
    }
}

pub fn unary(op: UnaryOp, input: &Tensor) -> Result<Tensor> {
    let dtype = unary_result_dtype(op, input.dtype())?;
    let values = input.scalars()?;
    let values = try_collect(values.len(), values.into_iter().map(|value| apply_unary(op, value)))?;
    finish(&[input], &values, input.shape(), dtype)
}

pub fn unary_in_place(op: UnaryOp, target: &Tensor) -> Result<()> {
    let dtype = unary_result_dtype(op, target.dtype())?;
    let values = target.scalars()?;
    let values = try_collect(values.len(), values.into_iter().map(|value| apply_unary(op, value)))?;
    store_in_place(target, &values, target.shape(), dtype)
}

// --- reductions -----------------------------------------------------------

fn sum_dtype(dtype: Dtype) -> Dtype {
    if dtype.category() <= Category::Integer {
        Dtype::Long
    } else {
        dtype
    }
}

fn accumulate(values: impl Iterator<Item = Scalar>, category: Category) -> Scalar {
    let mut acc = match category {
        Category::Complex => Scalar::Complex(Complex64::default()),
        Category::Floating => Scalar::Float(0.0),
        _ => Scalar::Int(0),
    };
    for value in values {
        acc = match (acc, category) {
            (Scalar::Complex(c), _) => {
                let v = value.as_complex();
                Scalar::Complex(Complex64::new(c.re + v.re, c.im + v.im))
            }
            (Scalar::Float(f), _) => Scalar::Float(f + value.as_f64()),
            (other, _) => Scalar::Int(other.as_i64().wrapping_add(value.as_i64())),
        };
    }
    acc
}

fn divide(value: Scalar, count: usize) -> Scalar {
    let n = count as f64;
    match value {
        Scalar::Complex(c) => Scalar::Complex(Complex64::new(c.re / n, c.im / n)),
        other => Scalar::Float(other.as_f64() / n),
    }
}

fn require_mean_dtype(dtype: Dtype) -> Result<()> {
    if dtype.is_floating_point() || dtype.is_complex() {
        return Ok(());
    }
    Err(Error::new(ErrorKind::Compute).with_message(format!(
        "mean(): could not infer output dtype; input dtype must be floating point or complex, got {dtype}"
    )))
}

pub fn sum(input: &Tensor) -> Result<Tensor> {
    let dtype = sum_dtype(input.dtype());
    let total = accumulate(input.scalars()?.into_iter(), dtype.category());
    finish(&[input], &[total], &[], dtype)
}

pub fn mean(input: &Tensor) -> Result<Tensor> {
    require_mean_dtype(input.dtype())?;
    let values = input.scalars()?;
    let count = values.len();
    let total = accumulate(values.into_iter(), input.dtype().category());
    finish(&[input], &[divide(total, count)], &[], input.dtype())
}

fn reduce_dim(
    input: &Tensor,
    dim: i64,
    keep_dim: bool,
    dtype: Dtype,
    reduce: impl Fn(Vec<Scalar>) -> Scalar,
) -> Result<Tensor> {
    let rank = input.dim();
    let axis = shape::normalize_dim(dim, rank)?;
    let values = input.scalars()?;
    let shape = input.shape();
    if rank == 0 {
        return finish(&[input], &[reduce(values)], &[], dtype);
    }
    let mut out_shape = shape.to_vec();
    if keep_dim {
        out_shape[axis] = 1;
    } else {
        out_shape.remove(axis);
    }
    let outer: usize = shape[..axis].iter().map(|&d| d as usize).product();
    let len = shape[axis] as usize;
    let inner: usize = shape[axis + 1..].iter().map(|&d| d as usize).product();
    let mut out = try_buffer(checked_count(&out_shape, dtype)?)?;
    for o in 0..outer {
        for i in 0..inner {
            let lane: Vec<Scalar> = (0..len).map(|k| values[(o * len + k) * inner + i]).collect();
            out.push(reduce(lane));
        }
    }
    finish(&[input], &out, &out_shape, dtype)
}

pub fn sum_dim(input: &Tensor, dim: i64, keep_dim: bool) -> Result<Tensor> {
    let dtype = sum_dtype(input.dtype());
    let category = dtype.category();
    reduce_dim(input, dim, keep_dim, dtype, |lane| accumulate(lane.into_iter(), category))
}

pub fn mean_dim(input: &Tensor, dim: i64, keep_dim: bool) -> Result<Tensor> {
    require_mean_dtype(input.dtype())?;
    let category = input.dtype().category();
    reduce_dim(input, dim, keep_dim, input.dtype(), |lane| {
        let count = lane.len();
        divide(accumulate(lane.into_iter(), category), count)
    })
}

fn extreme(input: &Tensor, name: &str, pick_greater: bool) -> Result<Tensor> {
    if input.dtype().is_complex() {
        return Err(Error::unsupported(format!("{name}() is not supported for complex tensors")));
    }
    let values = input.scalars()?;
    if values.is_empty() {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "{name}(): expected reduction dim to be specified for input.numel() == 0"
        )));
    }
    let mut best = values[0];
    for value in values.into_iter().skip(1) {
        let better = if input.dtype().is_floating_point() {
            let (v, b) = (value.as_f64(), best.as_f64());
            v.is_nan() || (!b.is_nan() && if pick_greater { v > b } else { v < b })
        } else {
            let (v, b) = (value.as_i64(), best.as_i64());
            if pick_greater { v > b } else { v < b }
        };
        if better {
            best = value;
        }
    }
    finish(&[input], &[best], &[], input.dtype())
}

pub fn max(input: &Tensor) -> Result<Tensor> {
    extreme(input, "max", true)
}

pub fn min(input: &Tensor) -> Result<Tensor> {
    extreme(input, "min", false)
}

// --- comparison -----------------------------------------------------------

fn scalars_equal(a: Scalar, b: Scalar, category: Category) -> bool {
    match category {
        Category::Complex => a.as_complex() == b.as_complex(),
        Category::Floating => a.as_f64() == b.as_f64(),
        Category::Integer => a.as_i64() == b.as_i64(),
        Category::Bool => a.as_bool() == b.as_bool(),
    }
}

pub fn eq(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let out_shape = shape::broadcast_shapes(a.shape(), b.shape())?;
    let category = a.dtype().promote(b.dtype()).category();
    let lhs = a.broadcast_values(&out_shape)?;
    let rhs = b.broadcast_values(&out_shape)?;
    let values = try_collect(
        lhs.len(),
        lhs.into_iter()
            .zip(rhs)
            .map(|(x, y)| Scalar::Bool(scalars_equal(x, y, category))),
    )?;
    finish(&[a, b], &values, &out_shape, Dtype::Bool)
}

pub fn equal(a: &Tensor, b: &Tensor) -> Result<bool> {
    if a.shape() != b.shape() {
        return Ok(false);
    }
    let category = a.dtype().promote(b.dtype()).category();
    Ok(a
        .scalars()?
        .into_iter()
        .zip(b.scalars()?)
        .all(|(x, y)| scalars_equal(x, y, category)))
}

pub fn allclose(a: &Tensor, b: &Tensor, rtol: f64, atol: f64, equal_nan: bool) -> Result<bool> {
    let out_shape = shape::broadcast_shapes(a.shape(), b.shape())?;
    let lhs = a.broadcast_values(&out_shape)?;
    let rhs = b.broadcast_values(&out_shape)?;
    Ok(lhs.into_iter().zip(rhs).all(|(x, y)| {
        let (x, y) = (x.as_complex(), y.as_complex());
        let nan = |c: Complex64| c.re.is_nan() || c.im.is_nan();
        if nan(x) || nan(y) {
            return equal_nan && nan(x) && nan(y);
        }
        if x == y {
            return true;
        }
        let diff = (x.re - y.re).hypot(x.im - y.im);
        diff <= atol + rtol * y.re.hypot(y.im)
    }))
}

// --- shape ----------------------------------------------------------------

pub fn cat(tensors: &[Tensor], dim: i64) -> Result<Tensor> {
    let first = tensors.first().ok_or_else(|| {
        Error::new(ErrorKind::Compute).with_message("cat expects a non-empty list of tensors")
    })?;
    let rank = first.dim();
    if rank == 0 {
        return Err(Error::new(ErrorKind::Compute)
            .with_message("zero-dimensional tensor cannot be concatenated"));
    }
    let axis = shape::normalize_dim(dim, rank)?;
    let mut dtype = first.dtype();
    let mut extent = 0i64;
    for (index, tensor) in tensors.iter().enumerate() {
        if tensor.dim() != rank {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "tensors must have same number of dimensions: got {rank} and {}",
                tensor.dim()
            )));
        }
        for (d, (&x, &y)) in first.shape().iter().zip(tensor.shape()).enumerate() {
            if d != axis && x != y {
                return Err(Error::new(ErrorKind::Compute).with_message(format!(
                    "sizes of tensors must match except in dimension {axis}: expected size {x} but got size {y} for tensor number {index}"
                )));
            }
        }
        dtype = dtype.promote(tensor.dtype());
        extent = extent.checked_add(tensor.shape()[axis]).ok_or_else(|| {
            Error::new(ErrorKind::Construction).with_message("cat: concatenated size is too large")
        })?;
    }
    let outer: usize = first.shape()[..axis].iter().map(|&d| d as usize).product();
    let inner: usize = first.shape()[axis + 1..].iter().map(|&d| d as usize).product();
    let parts = tensors
        .iter()
        .map(|t| t.scalars())
        .collect::<Result<Vec<_>>>()?;
    let mut out_shape = first.shape().to_vec();
    out_shape[axis] = extent;
    let mut values = try_buffer(checked_count(&out_shape, dtype)?)?;
    for o in 0..outer {
        for (tensor, part) in tensors.iter().zip(&parts) {
            let block = tensor.shape()[axis] as usize * inner;
            values.extend_from_slice(&part[o * block..(o + 1) * block]);
        }
    }
    let inputs: Vec<&Tensor> = tensors.iter().collect();
    finish(&inputs, &values, &out_shape, dtype)
}

pub fn stack(tensors: &[Tensor], dim: i64) -> Result<Tensor> {
    let first = tensors.first().ok_or_else(|| {
        Error::new(ErrorKind::Compute).with_message("stack expects a non-empty list of tensors")
    })?;
    for (index, tensor) in tensors.iter().enumerate() {
        if tensor.shape() != first.shape() {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "stack expects each tensor to be equal size, but got {:?} at entry 0 and {:?} at entry {index}",
                first.shape(),
                tensor.shape()
            )));
        }
    }
    let expanded = tensors
        .iter()
        .map(|t| unsqueeze(t, dim))
        .collect::<Result<Vec<_>>>()?;
    cat(&expanded, dim)
}

pub fn permute(input: &Tensor, dims: &[i64]) -> Result<Tensor> {
    let rank = input.dim();
    if dims.len() != rank {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "permute: number of dims don't match ({} given for a tensor of rank {rank})",
            dims.len()
        )));
    }
    let order = dims
        .iter()
        .map(|&d| shape::normalize_dim(d, rank))
        .collect::<Result<Vec<_>>>()?;
    let mut seen = vec![false; rank];
    for &axis in &order {
        if std::mem::replace(&mut seen[axis], true) {
            return Err(Error::new(ErrorKind::Compute)
                .with_message("permute: repeated dim in permutation"));
        }
    }
    let in_shape = input.shape();
    let in_strides = shape::strides(in_shape);
    let out_shape: Vec<i64> = order.iter().map(|&axis| in_shape[axis]).collect();
    let values = input.scalars()?;
    let count = values.len();
    let mut out = try_buffer(count)?;
    for linear in 0..count {
        let mut remaining = linear;
        let mut offset = 0;
        for (pos, &axis) in order.iter().enumerate().rev() {
            let extent = out_shape[pos] as usize;
            offset += (remaining % extent) * in_strides[axis];
            remaining /= extent;
        }
        out.push(values[offset]);
    }
    finish(&[input], &out, &out_shape, input.dtype())
}

pub fn transpose(input: &Tensor, dim0: i64, dim1: i64) -> Result<Tensor> {
    let rank = input.dim();
    if rank == 0 {
        return Ok(input.clone());
    }
    let a = shape::normalize_dim(dim0, rank)?;
    let b = shape::normalize_dim(dim1, rank)?;
    let mut order: Vec<i64> = (0..rank as i64).collect();
    order.swap(a, b);
    permute(input, &order)
}

pub fn flatten(input: &Tensor, start_dim: i64, end_dim: i64) -> Result<Tensor> {
    if input.dim() == 0 {
        return input.view(&[1]);
    }
    let start = shape::normalize_dim(start_dim, input.dim())?;
    let end = shape::normalize_dim(end_dim, input.dim())?;
    if start > end {
        return Err(Error::new(ErrorKind::Compute)
            .with_message("flatten() has invalid args: start_dim cannot come after end_dim"));
    }
    let shape = input.shape();
    let mut out: Vec<i64> = shape[..start].to_vec();
    out.push(shape[start..=end].iter().product());
    out.extend_from_slice(&shape[end + 1..]);
    input.view(&out)
}

pub fn squeeze(input: &Tensor) -> Result<Tensor> {
    let out: Vec<i64> = input.shape().iter().copied().filter(|&d| d != 1).collect();
    input.view(&out)
}

pub fn squeeze_dim(input: &Tensor, dim: i64) -> Result<Tensor> {
    if input.dim() == 0 {
        return Ok(input.clone());
    }
    let axis = shape::normalize_dim(dim, input.dim())?;
    let mut out = input.shape().to_vec();
    if out[axis] == 1 {
        out.remove(axis);
    }
    input.view(&out)
}

pub fn unsqueeze(input: &Tensor, dim: i64) -> Result<Tensor> {
    let axis = shape::normalize_dim(dim, input.dim() + 1)?;
    let mut out = input.shape().to_vec();
    out.insert(axis, 1);
    input.view(&out)
}

// --- linear algebra -------------------------------------------------------

pub fn mm(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.dim() != 2 || b.dim() != 2 {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "mm expects 2-D tensors, got {}-D and {}-D",
            a.dim(),
            b.dim()
        )));
    }
    let (n, k) = (a.shape()[0] as usize, a.shape()[1] as usize);
    let (k2, m) = (b.shape()[0] as usize, b.shape()[1] as usize);
    if k != k2 {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "mat1 and mat2 shapes cannot be multiplied ({n}x{k} and {k2}x{m})"
        )));
    }
    let dtype = a.dtype().promote(b.dtype());
    let category = dtype.category();
    if category == Category::Bool {
        return Err(Error::unsupported("mm is not implemented for bool tensors"));
    }
    let out_shape = [n as i64, m as i64];
    let mut out = try_buffer(checked_count(&out_shape, dtype)?)?;
    let lhs = a.scalars()?;
    let rhs = b.scalars()?;
    for i in 0..n {
        for j in 0..m {
            let mut acc = accumulate(std::iter::empty(), category);
            for p in 0..k {
                let product = apply_binary(BinaryOp::Mul, lhs[i * k + p], rhs[p * m + j], category)?;
                acc = apply_binary(BinaryOp::Add, acc, product, category)?;
            }
            out.push(acc);
        }
    }
    finish(&[a, b], &out, &out_shape, dtype)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longs(values: &[i64], shape: &[i64]) -> Tensor {
        let scalars: Vec<Scalar> = values.iter().map(|&v| Scalar::Int(v)).collect();
        Tensor::from_scalars(&scalars, shape, &TensorOptions::default().with_dtype(Dtype::Long))
            .expect("longs")
    }

    fn floats(values: &[f64], shape: &[i64]) -> Tensor {
        let scalars: Vec<Scalar> = values.iter().map(|&v| Scalar::Float(v)).collect();
        Tensor::from_scalars(&scalars, shape, &TensorOptions::default()).expect("floats")
    }

    fn as_f64(t: &Tensor) -> Vec<f64> {
        t.scalars().expect("scalars").into_iter().map(Scalar::as_f64).collect()
    }

    #[test]
    fn add_broadcasts_and_promotes() {
        let a = longs(&[1, 2, 3, 4, 5, 6], &[2, 3]);
        let b = floats(&[0.5, 0.5, 0.5], &[3]);
        let out = add(&a, &b, 2.0).expect("add");
        assert_eq!(out.dtype(), Dtype::Float);
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(as_f64(&out), vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn integer_division_is_true_division() {
        let out = div(&longs(&[1, 3], &[2]), &longs(&[2, 2], &[2])).expect("div");
        assert_eq!(out.dtype(), Dtype::Float);
        assert_eq!(as_f64(&out), vec![0.5, 1.5]);
    }

    #[test]
    fn in_place_rejects_wider_results() {
        let target = longs(&[1, 2], &[2]);
        let err = binary_in_place(BinaryOp::Div, &target, &longs(&[1, 1], &[2]), 1.0)
            .expect_err("float into long");
        assert_eq!(err.kind(), ErrorKind::Compute);
        let err = binary_in_place(BinaryOp::Add, &target, &longs(&[1, 1, 1, 1], &[2, 2]), 1.0)
            .expect_err("shape grows");
        assert!(err.to_string().contains("doesn't match the broadcast shape"));
        binary_in_place(BinaryOp::Add, &target, &longs(&[10], &[1]), 1.0).expect("add_");
        assert_eq!(as_f64(&target), vec![11.0, 12.0]);
    }

    #[test]
    fn reductions_by_dim() {
        let t = floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let rows = sum_dim(&t, 1, false).expect("sum rows");
        assert_eq!(rows.shape(), &[2]);
        assert_eq!(as_f64(&rows), vec![6.0, 15.0]);
        let cols = mean_dim(&t, 0, true).expect("mean cols");
        assert_eq!(cols.shape(), &[1, 3]);
        assert_eq!(as_f64(&cols), vec![2.5, 3.5, 4.5]);
        assert_eq!(as_f64(&sum(&t).expect("sum")), vec![21.0]);
        assert_eq!(as_f64(&max(&t).expect("max")), vec![6.0]);
        assert_eq!(as_f64(&min(&t).expect("min")), vec![1.0]);
        assert!(mean(&longs(&[1, 2], &[2])).is_err());
        assert_eq!(sum(&longs(&[1, 2], &[2])).expect("sum").dtype(), Dtype::Long);
    }

    #[test]
    fn cat_and_stack() {
        let a = floats(&[1.0, 2.0], &[1, 2]);
        let b = floats(&[3.0, 4.0, 5.0, 6.0], &[2, 2]);
        let rows = cat(&[a.clone(), b.clone()], 0).expect("cat rows");
        assert_eq!(rows.shape(), &[3, 2]);
        assert_eq!(as_f64(&rows), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(cat(&[a.clone(), b.clone()], 1).is_err());

        let x = floats(&[1.0, 2.0], &[2]);
        let y = floats(&[3.0, 4.0], &[2]);
        let stacked = stack(&[x.clone(), y.clone()], 1).expect("stack");
        assert_eq!(stacked.shape(), &[2, 2]);
        assert_eq!(as_f64(&stacked), vec![1.0, 3.0, 2.0, 4.0]);
        assert!(cat(&[], 0).is_err());
    }

    #[test]
    fn transpose_and_matmul() {
        let a = floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let t = transpose(&a, 0, 1).expect("transpose");
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(as_f64(&t), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        let product = mm(&a, &t).expect("mm");
        assert_eq!(as_f64(&product), vec![14.0, 32.0, 32.0, 77.0]);
        let err = mm(&a, &a).expect_err("shape mismatch");
        assert!(err.to_string().contains("2x3 and 2x3"));
    }

    #[test]
    fn squeeze_family_are_views() {
        let t = floats(&[1.0, 2.0], &[1, 2, 1]);
        let s = squeeze(&t).expect("squeeze");
        assert_eq!(s.shape(), &[2]);
        assert!(s.shares_storage_with(&t));
        assert_eq!(unsqueeze(&s, -1).expect("unsqueeze").shape(), &[2, 1]);
        assert_eq!(squeeze_dim(&t, 1).expect("noop").shape(), &[1, 2, 1]);
        assert_eq!(flatten(&t, 0, -1).expect("flatten").shape(), &[2]);
    }

    #[test]
    fn creation_helpers() {
        let r = arange(0.0, 5.0, 2.0, &TensorOptions::default()).expect("arange");
        assert_eq!(as_f64(&r), vec![0.0, 2.0, 4.0]);
        let l = linspace(0.0, 1.0, 5, &TensorOptions::default()).expect("linspace");
        assert_eq!(as_f64(&l), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let e = eye(2, 3, &TensorOptions::default()).expect("eye");
        assert_eq!(as_f64(&e), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        assert!(rand(&[2], &TensorOptions::default().with_dtype(Dtype::Long)).is_err());
        let ints = randint(&[64], 0, 3, &TensorOptions::default().with_dtype(Dtype::Long))
            .expect("randint");
        assert!(as_f64(&ints).iter().all(|v| (0.0..3.0).contains(v)));
    }

    #[test]
    fn comparisons() {
        let a = floats(&[1.0, 2.0, f64::NAN], &[3]);
        let b = floats(&[1.0, 2.5, f64::NAN], &[3]);
        let mask = eq(&a, &b).expect("eq");
        assert_eq!(mask.dtype(), Dtype::Bool);
        assert_eq!(as_f64(&mask), vec![1.0, 0.0, 0.0]);
        assert!(!equal(&a, &b).expect("equal"));
        assert!(allclose(&a, &b, 0.0, 0.6, true).expect("close"));
        assert!(!allclose(&a, &b, 0.0, 0.6, false).expect("nan differs"));
    }
}
