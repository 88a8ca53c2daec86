// Shape arithmetic shared by views, broadcasting and reductions.
use crate::core::error::{Error, ErrorKind, Result};

pub fn numel(shape: &[i64]) -> Result<usize> {
    let mut total: usize = 1;
    for &dim in shape {
        let dim = usize::try_from(dim).map_err(|_| {
            Error::new(ErrorKind::Construction)
                .with_message(format!("negative dimension in shape {shape:?}"))
        })?;
        total = total.checked_mul(dim).ok_or_else(|| too_large(shape))?;
    }
    Ok(total)
}

/// Byte length of contiguous storage for `shape`; never wraps.
pub fn storage_bytes(shape: &[i64], element_size: usize) -> Result<usize> {
    match numel(shape)?.checked_mul(element_size) {
        Some(bytes) if bytes <= isize::MAX as usize => Ok(bytes),
        _ => Err(too_large(shape)),
    }
}

fn too_large(shape: &[i64]) -> Error {
    Error::new(ErrorKind::Construction).with_message(format!("shape {shape:?} is too large"))
}

/// Resolves a single `-1` entry against the element count of the source.
pub fn infer_view_shape(requested: &[i64], count: usize) -> Result<Vec<i64>> {
    let invalid = || {
        Error::new(ErrorKind::Compute)
            .with_message(format!("shape '{requested:?}' is invalid for input of size {count}"))
    };
    let mut inferred = None;
    let mut known: usize = 1;
    for (index, &dim) in requested.iter().enumerate() {
        match dim {
            -1 if inferred.is_none() => inferred = Some(index),
            -1 => {
                return Err(Error::new(ErrorKind::Compute)
                    .with_message("only one dimension can be inferred"));
            }
            d if d < 0 => {
                return Err(Error::new(ErrorKind::Compute)
                    .with_message(format!("invalid shape dimension {d}")));
            }
            d => known = known.checked_mul(d as usize).ok_or_else(invalid)?,
        }
    }
    let mut shape = requested.to_vec();
    match inferred {
        Some(index) => {
            if known == 0 || count % known != 0 {
                return Err(invalid());
            }
            shape[index] = (count / known) as i64;
        }
        None if known != count => return Err(invalid()),
        None => {}
    }
    Ok(shape)
}

/// Numpy-style broadcast of two shapes.
pub fn broadcast_shapes(a: &[i64], b: &[i64]) -> Result<Vec<i64>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0i64; rank];
    for i in 0..rank {
        let da = dim_from_right(a, rank, i);
        let db = dim_from_right(b, rank, i);
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            (x, y) => {
                return Err(Error::new(ErrorKind::Compute).with_message(format!(
                    "the size of tensor a ({x}) must match the size of tensor b ({y}) at non-singleton dimension {i}"
                )));
            }
        };
    }
    Ok(out)
}

/// Target shape of `expand(sizes)`; `-1` keeps an existing dimension.
pub fn expand_shape(source: &[i64], sizes: &[i64]) -> Result<Vec<i64>> {
    if sizes.len() < source.len() {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "the number of sizes provided ({}) must be greater or equal to the number of dimensions in the tensor ({})",
            sizes.len(),
            source.len()
        )));
    }
    let lead = sizes.len() - source.len();
    let mut out = Vec::with_capacity(sizes.len());
    for (i, &size) in sizes.iter().enumerate() {
        if i < lead {
            if size < 0 {
                return Err(Error::new(ErrorKind::Compute).with_message(format!(
                    "the expanded size of the tensor ({size}) isn't allowed in a leading, non-existing dimension {i}"
                )));
            }
            out.push(size);
            continue;
        }
        let existing = source[i - lead];
        let target = if size == -1 { existing } else { size };
        if target != existing && existing != 1 {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "the expanded size of the tensor ({target}) must match the existing size ({existing}) at non-singleton dimension {i}"
            )));
        }
        if target < 0 {
            return Err(Error::new(ErrorKind::Compute)
                .with_message(format!("invalid expanded size {target}")));
        }
        out.push(target);
    }
    Ok(out)
}

/// Row-major strides in elements.
pub fn strides(shape: &[i64]) -> Vec<usize> {
    let mut out = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        out[i] = out[i + 1] * shape[i + 1].max(0) as usize;
    }
    out
}

/// Maps a linear index in `out_shape` to the linear index of a broadcast source.
pub fn broadcast_source_index(linear: usize, out_shape: &[i64], source_shape: &[i64]) -> usize {
    let rank = out_shape.len();
    let lead = rank - source_shape.len();
    let source_strides = strides(source_shape);
    let mut remaining = linear;
    let mut offset = 0usize;
    for axis in (0..rank).rev() {
        let extent = out_shape[axis].max(1) as usize;
        let coord = remaining % extent;
        remaining /= extent;
        if axis >= lead {
            let src_axis = axis - lead;
            if source_shape[src_axis] != 1 {
                offset += coord * source_strides[src_axis];
            }
        }
    }
    offset
}

/// Wraps a possibly-negative dimension into `0..rank`.
pub fn normalize_dim(dim: i64, rank: usize) -> Result<usize> {
    let rank_i = rank as i64;
    let wrapped = if dim < 0 { dim + rank_i } else { dim };
    if wrapped < 0 || wrapped >= rank_i.max(1) {
        return Err(Error::new(ErrorKind::Compute).with_message(format!(
            "dimension out of range (expected to be in range of [{}, {}], but got {dim})",
            -rank_i.max(1),
            rank_i.max(1) - 1
        )));
    }
    Ok(wrapped as usize)
}

fn dim_from_right(shape: &[i64], rank: usize, i: usize) -> i64 {
    let lead = rank - shape.len();
    if i < lead { 1 } else { shape[i - lead] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_inference_resolves_one_wildcard() {
        assert_eq!(infer_view_shape(&[3, -1], 6).expect("infer"), vec![3, 2]);
        assert_eq!(infer_view_shape(&[6], 6).expect("exact"), vec![6]);
        assert!(infer_view_shape(&[4, -1], 6).is_err());
        assert!(infer_view_shape(&[-1, -1], 6).is_err());
        assert!(infer_view_shape(&[5], 6).is_err());
    }

    #[test]
    fn storage_size_is_checked() {
        assert_eq!(storage_bytes(&[2, 3], 8).expect("small"), 48);
        assert_eq!(storage_bytes(&[], 4).expect("scalar"), 4);
        let err = storage_bytes(&[1 << 62], 8).expect_err("wraps");
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(err.to_string().contains("is too large"));
        assert!(storage_bytes(&[1 << 40, 1 << 40], 1).is_err());
    }

    #[test]
    fn broadcasting_follows_numpy_rules() {
        assert_eq!(broadcast_shapes(&[2, 3], &[3]).expect("row"), vec![2, 3]);
        assert_eq!(broadcast_shapes(&[2, 1], &[1, 4]).expect("outer"), vec![2, 4]);
        assert_eq!(broadcast_shapes(&[], &[5]).expect("scalar"), vec![5]);
        assert!(broadcast_shapes(&[2, 3], &[2]).is_err());
    }

    #[test]
    fn expand_keeps_existing_and_grows_singletons() {
        assert_eq!(expand_shape(&[3, 1], &[3, 4]).expect("grow"), vec![3, 4]);
        assert_eq!(expand_shape(&[3, 1], &[2, -1, 4]).expect("lead"), vec![2, 3, 4]);
        assert!(expand_shape(&[3, 2], &[3, 4]).is_err());
        assert!(expand_shape(&[3], &[-1, 3]).is_err());
    }

    #[test]
    fn broadcast_index_repeats_singleton_axes() {
        let out = [2, 3];
        let src = [1, 3];
        let mapped: Vec<usize> = (0..6).map(|i| broadcast_source_index(i, &out, &src)).collect();
        assert_eq!(mapped, vec![0, 1, 2, 0, 1, 2]);
        let col = [2, 1];
        let mapped: Vec<usize> = (0..6).map(|i| broadcast_source_index(i, &out, &col)).collect();
        assert_eq!(mapped, vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn negative_dims_wrap() {
        assert_eq!(normalize_dim(-1, 3).expect("wrap"), 2);
        assert!(normalize_dim(3, 3).is_err());
    }
}
