//! Purpose: Persisted tensor format (encode/decode bytes, save/load paths).
//! Exports: `TENSOR_FORMAT_VERSION`, `encode`, `decode`, `save`, `load`.
//! Role: Engine-side codec behind tensor save/load and ByteBuffer interchange.
//! Invariants: All header fields and payload elements are little-endian on disk.
//! Invariants: Decode never trusts a length field before checking it against the input size.
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::dtype::Dtype;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::shape;
use crate::core::tensor::Tensor;

pub const TENSOR_MAGIC: [u8; 4] = *b"CTNS";
pub const TENSOR_FORMAT_VERSION: u32 = 1;
pub const SUPPORTED_TENSOR_FORMAT_VERSIONS: &[u32] = &[TENSOR_FORMAT_VERSION];

const FIXED_HEADER_LEN: usize = 16;
const DIGEST_LEN: usize = 32;
const MAX_DIMS: u32 = 64;

pub fn encode(tensor: &Tensor) -> Result<Vec<u8>> {
    let payload = to_little_endian(tensor.to_bytes()?, tensor.dtype());
    let mut out = Vec::with_capacity(
        FIXED_HEADER_LEN + tensor.dim() * 8 + 8 + payload.len() + DIGEST_LEN,
    );
    out.extend_from_slice(&TENSOR_MAGIC);
    out.extend_from_slice(&TENSOR_FORMAT_VERSION.to_le_bytes());
    out.push(tensor.dtype().code() as u8);
    out.extend_from_slice(&[0u8; 3]);
    out.extend_from_slice(&(tensor.dim() as u32).to_le_bytes());
    for &dim in tensor.shape() {
        out.extend_from_slice(&dim.to_le_bytes());
    }
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&Sha256::digest(&payload));
    Ok(out)
}

pub fn decode(buf: &[u8]) -> Result<Tensor> {
    let mut reader = Reader { buf, offset: 0 };
    if reader.take(4)? != TENSOR_MAGIC {
        return Err(corrupt("bad tensor magic"));
    }
    let version = reader.u32()?;
    if !SUPPORTED_TENSOR_FORMAT_VERSIONS.contains(&version) {
        return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
            "unsupported tensor format version {version} (supported: {TENSOR_FORMAT_VERSION})"
        )));
    }
    let dtype = Dtype::from_code(reader.take(1)?[0] as i8)
        .map_err(|err| corrupt("unknown dtype code").with_source(err))?;
    reader.take(3)?;
    let ndim = reader.u32()?;
    if ndim > MAX_DIMS {
        return Err(corrupt(format!("tensor rank {ndim} exceeds {MAX_DIMS}")));
    }
    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        dims.push(i64::from_le_bytes(array8(reader.take(8)?)));
    }
    let count = shape::numel(&dims).map_err(|err| corrupt("invalid tensor shape").with_source(err))?;
    let payload_len = reader.u64()?;
    let expected = count
        .checked_mul(dtype.element_size())
        .ok_or_else(|| corrupt("tensor payload size overflows"))?;
    if payload_len != expected as u64 {
        return Err(corrupt(format!(
            "payload length {payload_len} does not match shape {dims:?} of {dtype}"
        )));
    }
    let payload = reader.take(expected)?;
    let digest = reader.take(DIGEST_LEN)?;
    if Sha256::digest(payload).as_slice() != digest {
        return Err(corrupt("payload digest mismatch"));
    }
    if reader.offset != buf.len() {
        return Err(corrupt("trailing bytes after tensor payload"));
    }
    let native = to_little_endian(payload.to_vec(), dtype);
    Tensor::from_bytes(&native, dtype, &dims)
}

pub fn save(tensor: &Tensor, path: &Path) -> Result<()> {
    let bytes = encode(tensor)?;
    fs::write(path, bytes).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write tensor")
            .with_path(path)
            .with_source(err)
    })
}

pub fn load(path: &Path) -> Result<Tensor> {
    let bytes = fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read tensor")
            .with_path(path)
            .with_source(err)
    })?;
    decode(&bytes).map_err(|err| err.with_path(path))
}

fn corrupt(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Corrupt).with_message(message)
}

// Byte order swap is its own inverse, so the same routine serves both directions.
fn to_little_endian(mut bytes: Vec<u8>, dtype: Dtype) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        return bytes;
    }
    let unit = if dtype.is_complex() {
        dtype.element_size() / 2
    } else {
        dtype.element_size()
    };
    if unit > 1 {
        for chunk in bytes.chunks_exact_mut(unit) {
            chunk.reverse();
        }
    }
    bytes
}

struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| corrupt("tensor data truncated"))?;
        let out = &self.buf[self.offset..end];
        self.offset = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(out))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(array8(self.take(8)?)))
    }
}

fn array8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&bytes[..8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dtype::Scalar;
    use crate::core::options::TensorOptions;

    fn sample() -> Tensor {
        let values: Vec<Scalar> = (0..6).map(|v| Scalar::Int(v * 3 - 4)).collect();
        Tensor::from_scalars(&values, &[2, 3], &TensorOptions::default().with_dtype(Dtype::Short))
            .expect("sample")
    }

    #[test]
    fn encode_decode_preserves_tensor() {
        let tensor = sample();
        let bytes = encode(&tensor).expect("encode");
        assert_eq!(&bytes[0..4], b"CTNS");
        let back = decode(&bytes).expect("decode");
        assert_eq!(back.dtype(), Dtype::Short);
        assert_eq!(back.shape(), &[2, 3]);
        assert_eq!(back.to_bytes().expect("bytes"), tensor.to_bytes().expect("bytes"));
    }

    #[test]
    fn decode_rejects_damaged_input() {
        let bytes = encode(&sample()).expect("encode");

        let err = decode(&bytes[..bytes.len() - 1]).expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::Corrupt);

        let mut flipped = bytes.clone();
        let payload_at = FIXED_HEADER_LEN + 2 * 8 + 8;
        flipped[payload_at] ^= 0xff;
        let err = decode(&flipped).expect_err("digest");
        assert!(err.to_string().contains("digest"));

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 9;
        assert!(decode(&wrong_version).expect_err("version").to_string().contains("version 9"));

        let mut bad_magic = bytes;
        bad_magic[0] = b'X';
        assert_eq!(decode(&bad_magic).expect_err("magic").kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn load_reports_path_on_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.ctns");
        let err = load(&path).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.path(), Some(path.as_path()));

        let saved = dir.path().join("t.ctns");
        save(&sample(), &saved).expect("save");
        assert_eq!(load(&saved).expect("load").numel(), 6);
    }
}
