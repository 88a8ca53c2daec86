//! Purpose: The engine's tensor object: shared contiguous storage plus metadata.
//! Exports: `Tensor`.
//! Role: Native object wrapped by tensor handles at the boundary.
//! Invariants: Storage is row-major and contiguous; its byte length never changes after allocation.
//! Invariants: Cloning a `Tensor` shares storage (like a refcounted engine tensor); `deep_copy` does not.
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config;
use crate::core::device::Device;
use crate::core::dtype::{Dtype, Scalar};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::options::TensorOptions;
use crate::core::shape;

#[derive(Debug)]
struct Storage {
    bytes: RwLock<Vec<u8>>,
}

#[derive(Clone, Debug)]
pub struct Tensor {
    storage: Arc<Storage>,
    dtype: Dtype,
    shape: Vec<i64>,
    device: Device,
    requires_grad: bool,
}

impl Tensor {
    /// Copies `data` (host byte order) into a new tensor.
    pub fn from_bytes(data: &[u8], dtype: Dtype, shape: &[i64]) -> Result<Self> {
        dtype.ensure_supported()?;
        let expected = shape::storage_bytes(shape, dtype.element_size())?;
        if data.len() != expected {
            return Err(Error::length_mismatch(expected, data.len()));
        }
        let mut bytes = try_buffer(expected)?;
        bytes.extend_from_slice(data);
        Ok(Self::from_storage(bytes, dtype, shape.to_vec(), Device::CPU))
    }

    pub fn from_scalars(values: &[Scalar], shape: &[i64], options: &TensorOptions) -> Result<Self> {
        options.validate_for_creation()?;
        let size = options.dtype.element_size();
        let len = shape::storage_bytes(shape, size)?;
        if values.len() != len / size {
            return Err(Error::length_mismatch(len / size, values.len()));
        }
        let mut bytes = try_buffer(len)?;
        bytes.resize(len, 0);
        for (chunk, value) in bytes.chunks_exact_mut(size).zip(values) {
            options.dtype.write(*value, chunk);
        }
        let mut tensor = Self::from_storage(bytes, options.dtype, shape.to_vec(), options.device);
        tensor.requires_grad = options.requires_grad;
        Ok(tensor)
    }

    /// Repeats one encoded element; never materializes per-element scalars.
    pub fn full(shape: &[i64], value: Scalar, options: &TensorOptions) -> Result<Self> {
        options.validate_for_creation()?;
        let size = options.dtype.element_size();
        let len = shape::storage_bytes(shape, size)?;
        let mut element = [0u8; 16];
        options.dtype.write(value, &mut element[..size]);
        let mut bytes = try_buffer(len)?;
        for _ in 0..len / size {
            bytes.extend_from_slice(&element[..size]);
        }
        let mut tensor = Self::from_storage(bytes, options.dtype, shape.to_vec(), options.device);
        tensor.requires_grad = options.requires_grad;
        Ok(tensor)
    }

    pub fn zeros(shape: &[i64], options: &TensorOptions) -> Result<Self> {
        Self::full(shape, Scalar::Int(0), options)
    }

    pub fn ones(shape: &[i64], options: &TensorOptions) -> Result<Self> {
        Self::full(shape, Scalar::Int(1), options)
    }

    pub fn scalar(value: Scalar, dtype: Dtype) -> Result<Self> {
        Self::full(&[], value, &TensorOptions::default().with_dtype(dtype))
    }

    fn from_storage(bytes: Vec<u8>, dtype: Dtype, shape: Vec<i64>, device: Device) -> Self {
        Self {
            storage: Arc::new(Storage {
                bytes: RwLock::new(bytes),
            }),
            dtype,
            shape,
            device,
            requires_grad: false,
        }
    }

    /// Options describing this tensor, used by the `*_like` constructors.
    pub fn options(&self) -> TensorOptions {
        TensorOptions::default()
            .with_dtype(self.dtype)
            .with_device(self.device)
    }

    pub fn dtype(&self) -> Dtype {
        self.dtype
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().map(|&d| d as usize).product()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) -> Result<()> {
        if requires_grad && !self.dtype.is_floating_point() && !self.dtype.is_complex() {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "only tensors of floating point and complex dtype can require gradients, got {}",
                self.dtype
            )));
        }
        self.requires_grad = requires_grad;
        Ok(())
    }

    pub fn shares_storage_with(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    fn read_bytes(&self) -> Result<RwLockReadGuard<'_, Vec<u8>>> {
        self.storage
            .bytes
            .read()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("tensor storage lock poisoned"))
    }

    fn write_bytes(&self) -> Result<RwLockWriteGuard<'_, Vec<u8>>> {
        self.storage
            .bytes
            .write()
            .map_err(|_| Error::new(ErrorKind::Internal).with_message("tensor storage lock poisoned"))
    }

    /// Raw pointer to element 0. Valid while any tensor sharing this storage is alive.
    pub fn data_ptr(&self) -> Result<*const u8> {
        Ok(self.read_bytes()?.as_ptr())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = self.read_bytes()?;
        let mut out = try_buffer(bytes.len())?;
        out.extend_from_slice(&bytes);
        Ok(out)
    }

    pub fn scalars(&self) -> Result<Vec<Scalar>> {
        let bytes = self.read_bytes()?;
        let size = self.dtype.element_size();
        try_collect(
            bytes.len() / size,
            bytes.chunks_exact(size).map(|chunk| self.dtype.read(chunk)),
        )
    }

    /// Builds a result tensor on this tensor's device, inheriting the gradient flag when grad mode is on.
    pub(crate) fn derived(&self, values: &[Scalar], shape: &[i64], dtype: Dtype) -> Result<Self> {
        self.device.ensure_available()?;
        let options = TensorOptions::default().with_dtype(dtype);
        let mut out = Tensor::from_scalars(values, shape, &options)?;
        out.requires_grad = self.requires_grad && config::is_grad_enabled() && !dtype_lacks_grad(dtype);
        Ok(out)
    }

    pub fn deep_copy(&self) -> Result<Self> {
        let bytes = self.to_bytes()?;
        let mut out = Self::from_storage(bytes, self.dtype, self.shape.clone(), self.device);
        out.requires_grad = self.requires_grad;
        Ok(out)
    }

    pub fn view(&self, shape: &[i64]) -> Result<Self> {
        let shape = shape::infer_view_shape(shape, self.numel())?;
        Ok(Self {
            shape,
            ..self.clone()
        })
    }

    pub fn view_as(&self, other: &Tensor) -> Result<Self> {
        self.view(other.shape())
    }

    /// Contiguous storage means every valid reshape is also a view.
    pub fn reshape(&self, shape: &[i64]) -> Result<Self> {
        self.view(shape)
    }

    pub fn reshape_as(&self, other: &Tensor) -> Result<Self> {
        self.reshape(other.shape())
    }

    /// Materializes the broadcast; the result does not alias the source.
    pub fn expand(&self, sizes: &[i64]) -> Result<Self> {
        let target = shape::expand_shape(&self.shape, sizes)?;
        let values = self.broadcast_values(&target)?;
        let mut out = self.derived(&values, &target, self.dtype)?;
        out.requires_grad = self.requires_grad;
        Ok(out)
    }

    pub fn expand_as(&self, other: &Tensor) -> Result<Self> {
        self.expand(other.shape())
    }

    pub(crate) fn broadcast_values(&self, target: &[i64]) -> Result<Vec<Scalar>> {
        let values = self.scalars()?;
        if target == self.shape.as_slice() {
            return Ok(values);
        }
        let count = shape::numel(target)?;
        try_collect(
            count,
            (0..count).map(|i| values[shape::broadcast_source_index(i, target, &self.shape)]),
        )
    }

    /// Rebinds this tensor to `other`'s storage and metadata.
    pub fn set_data(&mut self, other: &Tensor) -> Result<()> {
        if self.device != other.device {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "set_data: tensor on {} is not compatible with tensor on {}",
                self.device, other.device
            )));
        }
        self.storage = Arc::clone(&other.storage);
        self.dtype = other.dtype;
        self.shape = other.shape.clone();
        Ok(())
    }

    /// Writes `source` into this tensor's storage, broadcasting and casting as needed.
    pub fn copy_from(&self, source: &Tensor) -> Result<()> {
        self.device.ensure_available()?;
        source.device.ensure_available()?;
        shape::broadcast_shapes(&self.shape, &source.shape).and_then(|broadcast| {
            if broadcast != self.shape {
                Err(Error::new(ErrorKind::Compute).with_message(format!(
                    "copy_: source of shape {:?} cannot be broadcast to {:?}",
                    source.shape, self.shape
                )))
            } else {
                Ok(())
            }
        })?;
        let values = source.broadcast_values(&self.shape)?;
        self.write_scalars(&values)
    }

    pub(crate) fn write_scalars(&self, values: &[Scalar]) -> Result<()> {
        let size = self.dtype.element_size();
        let mut bytes = self.write_bytes()?;
        if bytes.len() / size != values.len() {
            return Err(Error::length_mismatch(bytes.len() / size, values.len()));
        }
        for (chunk, value) in bytes.chunks_exact_mut(size).zip(values) {
            self.dtype.write(*value, chunk);
        }
        Ok(())
    }

    pub(crate) fn write_element(&self, index: usize, value: Scalar) -> Result<()> {
        let size = self.dtype.element_size();
        let mut bytes = self.write_bytes()?;
        let chunk = bytes
            .get_mut(index * size..(index + 1) * size)
            .ok_or_else(|| {
                Error::new(ErrorKind::Internal)
                    .with_message(format!("element {index} is outside the tensor's storage"))
            })?;
        self.dtype.write(value, chunk);
        Ok(())
    }

    /// Same dtype returns an alias, like the engine's `to`.
    pub fn to_dtype(&self, dtype: Dtype) -> Result<Self> {
        dtype.ensure_supported()?;
        if dtype == self.dtype {
            return Ok(self.clone());
        }
        let values = self.scalars()?;
        let mut out = self.derived(&values, &self.shape.clone(), dtype)?;
        out.requires_grad = self.requires_grad && !dtype_lacks_grad(dtype);
        Ok(out)
    }

    pub fn to_device(&self, device: Device) -> Result<Self> {
        device.ensure_available()?;
        self.device.ensure_available()?;
        Ok(Self {
            device,
            ..self.clone()
        })
    }

    pub fn to(&self, device: Device, dtype: Dtype) -> Result<Self> {
        self.to_device(device)?.to_dtype(dtype)
    }

    pub fn pin_memory(&self) -> Result<Self> {
        Err(Error::unsupported("pin_memory requires an accelerator"))
    }

    pub fn detach(&self) -> Self {
        Self {
            requires_grad: false,
            ..self.clone()
        }
    }

    pub fn backward(&self) -> Result<()> {
        Err(Error::unsupported(
            "backward: the reference engine does not record autograd graphs",
        ))
    }

    pub fn grad(&self) -> Result<Self> {
        Err(Error::new(ErrorKind::Compute)
            .with_message("grad: tensor has no accumulated gradient"))
    }

    /// Advanced indexing along dim 0 with an integer index tensor.
    pub fn index_select0(&self, index: &Tensor) -> Result<Self> {
        if index.dtype.category() != crate::core::dtype::Category::Integer {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "tensors used as indices must be integer tensors, got {}",
                index.dtype
            )));
        }
        if self.dim() == 0 {
            return Err(Error::new(ErrorKind::Compute)
                .with_message("cannot index a zero-dimensional tensor"));
        }
        let rows = self.shape[0];
        let row_len: usize = self.shape[1..].iter().map(|&d| d as usize).product();
        let values = self.scalars()?;
        let capacity = index.numel().checked_mul(row_len).ok_or_else(|| {
            Error::new(ErrorKind::Construction)
                .with_message(format!("index_select: result of {} rows is too large", index.numel()))
        })?;
        let mut out = try_buffer(capacity)?;
        for raw in index.scalars()? {
            let i = raw.as_i64();
            let wrapped = if i < 0 { i + rows } else { i };
            if wrapped < 0 || wrapped >= rows {
                return Err(Error::new(ErrorKind::Compute).with_message(format!(
                    "index {i} is out of bounds for dimension 0 with size {rows}"
                )));
            }
            let start = wrapped as usize * row_len;
            out.extend_from_slice(&values[start..start + row_len]);
        }
        let mut out_shape = index.shape.clone();
        out_shape.extend_from_slice(&self.shape[1..]);
        self.derived(&out, &out_shape, self.dtype)
    }

    pub fn item(&self) -> Result<Scalar> {
        let count = self.numel();
        if count != 1 {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "a tensor with {count} elements cannot be converted to a scalar"
            )));
        }
        Ok(self.scalars()?[0])
    }
}

/// Empty buffer with room for `len` items. Allocator refusal is a Compute failure, not an abort.
pub(crate) fn try_buffer<T>(len: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| {
        Error::new(ErrorKind::Compute).with_message(format!(
            "can't allocate memory: you tried to allocate {} bytes",
            len.saturating_mul(std::mem::size_of::<T>())
        ))
    })?;
    Ok(buffer)
}

pub(crate) fn try_collect<T>(len: usize, items: impl Iterator<Item = T>) -> Result<Vec<T>> {
    let mut out = try_buffer(len)?;
    out.extend(items);
    Ok(out)
}

fn dtype_lacks_grad(dtype: Dtype) -> bool {
    !dtype.is_floating_point() && !dtype.is_complex()
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.scalars().map_err(|_| fmt::Error)?;
        f.write_str("tensor(")?;
        write_nested(f, &values, &self.shape, 0, 7)?;
        write!(f, ", dtype={}", self.dtype)?;
        if !self.device.is_cpu() {
            write!(f, ", device={}", self.device)?;
        }
        if self.requires_grad {
            f.write_str(", requires_grad=True")?;
        }
        f.write_str(")")
    }
}

fn write_nested(
    f: &mut fmt::Formatter<'_>,
    values: &[Scalar],
    shape: &[i64],
    axis: usize,
    indent: usize,
) -> fmt::Result {
    if shape.len() == axis {
        return write_scalar(f, values.first().copied().unwrap_or(Scalar::Int(0)));
    }
    let extent = shape[axis].max(0) as usize;
    let chunk = if extent == 0 { 0 } else { values.len() / extent };
    f.write_str("[")?;
    for i in 0..extent {
        if i > 0 {
            f.write_str(",")?;
            if axis + 1 < shape.len() {
                write!(f, "\n{:width$}", "", width = indent + axis + 1)?;
            } else {
                f.write_str(" ")?;
            }
        }
        write_nested(f, &values[i * chunk..(i + 1) * chunk], shape, axis + 1, indent)?;
    }
    f.write_str("]")
}

fn write_scalar(f: &mut fmt::Formatter<'_>, value: Scalar) -> fmt::Result {
    match value {
        Scalar::Bool(v) => write!(f, "{}", if v { "True" } else { "False" }),
        Scalar::Int(v) => write!(f, "{v}"),
        Scalar::Float(v) => write!(f, "{v:.4}"),
        Scalar::Complex(v) => write!(f, "{:.4}{:+.4}j", v.re, v.im),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(values: &[f32], shape: &[i64]) -> Tensor {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Tensor::from_bytes(&bytes, Dtype::Float, shape).expect("tensor")
    }

    #[test]
    fn from_bytes_checks_length_against_shape() {
        let err = Tensor::from_bytes(&[0u8; 8], Dtype::Float, &[3]).expect_err("short");
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
        let t = floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(t.dim(), 2);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.numel(), 6);
    }

    #[test]
    fn views_share_storage_and_see_copies() {
        let t = floats(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let v = t.view(&[-1]).expect("view");
        assert!(v.shares_storage_with(&t));
        v.copy_from(&floats(&[9.0], &[1])).expect("broadcast copy");
        assert!(t.scalars().expect("scalars").iter().all(|s| s.as_f64() == 9.0));
    }

    #[test]
    fn deep_copy_is_independent() {
        let t = floats(&[1.0, 2.0], &[2]);
        let c = t.deep_copy().expect("copy");
        assert!(!c.shares_storage_with(&t));
        c.copy_from(&floats(&[0.0, 0.0], &[2])).expect("copy_");
        assert_eq!(t.scalars().expect("scalars")[1].as_f64(), 2.0);
    }

    #[test]
    fn expand_materializes_broadcast() {
        let t = floats(&[1.0, 2.0, 3.0], &[3]);
        let e = t.expand(&[2, 3]).expect("expand");
        assert_eq!(e.shape(), &[2, 3]);
        let values: Vec<f64> = e.scalars().expect("values").iter().map(|s| s.as_f64()).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        assert!(t.expand(&[2, 2]).is_err());
    }

    #[test]
    fn index_select_picks_rows() {
        let t = floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]);
        let index = Tensor::from_bytes(
            &[2i64, -3].iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<_>>(),
            Dtype::Long,
            &[2],
        )
        .expect("index");
        let picked = t.index_select0(&index).expect("select");
        assert_eq!(picked.shape(), &[2, 2]);
        let values: Vec<f64> = picked.scalars().expect("values").iter().map(|s| s.as_f64()).collect();
        assert_eq!(values, vec![5.0, 6.0, 1.0, 2.0]);

        let out_of_range = Tensor::scalar(Scalar::Int(3), Dtype::Long).expect("scalar");
        assert_eq!(
            t.index_select0(&out_of_range).expect_err("oob").kind(),
            ErrorKind::Compute
        );
    }

    #[test]
    fn item_requires_single_element() {
        let t = floats(&[2.5], &[1]);
        assert_eq!(t.item().expect("item").as_f64(), 2.5);
        assert!(floats(&[1.0, 2.0], &[2]).item().is_err());
    }

    #[test]
    fn integer_tensors_cannot_require_grad() {
        let mut t = Tensor::zeros(&[2], &TensorOptions::default().with_dtype(Dtype::Long))
            .expect("zeros");
        assert!(t.set_requires_grad(true).is_err());
        let mut f = Tensor::zeros(&[2], &TensorOptions::default()).expect("zeros");
        f.set_requires_grad(true).expect("float grad");
        assert!(f.requires_grad());
        assert!(!f.detach().requires_grad());
    }

    #[test]
    fn display_nests_rows() {
        let t = Tensor::from_bytes(
            &[1i64, 2, 3, 4].iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<_>>(),
            Dtype::Long,
            &[2, 2],
        )
        .expect("tensor");
        assert_eq!(t.to_string(), "tensor([[1, 2],\n        [3, 4]], dtype=int64)");
    }
}
