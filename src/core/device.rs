//! Purpose: Parse and describe compute devices.
//! Exports: `Device`, `DeviceType`.
//! Role: Device descriptors accepted at the boundary (`<type>[:<index>]`).
//! Invariants: Only `cpu` executes in the reference engine; other types are valid names only.
use std::fmt;
use std::str::FromStr;

use crate::core::error::{Error, ErrorKind, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(i16)]
pub enum DeviceType {
    Cpu = 0,
    Cuda = 1,
    Mps = 13,
    Meta = 14,
}

impl DeviceType {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceType::Cpu => "cpu",
            DeviceType::Cuda => "cuda",
            DeviceType::Mps => "mps",
            DeviceType::Meta => "meta",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "cpu" => Some(DeviceType::Cpu),
            "cuda" => Some(DeviceType::Cuda),
            "mps" => Some(DeviceType::Mps),
            "meta" => Some(DeviceType::Meta),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Device {
    kind: DeviceType,
    index: Option<i8>,
}

impl Device {
    pub const CPU: Device = Device {
        kind: DeviceType::Cpu,
        index: None,
    };

    pub fn new(kind: DeviceType, index: Option<i8>) -> Result<Self> {
        if let Some(index) = index {
            if index < 0 {
                return Err(Error::new(ErrorKind::Construction)
                    .with_message(format!("device index must be non-negative, got {index}")));
            }
            if kind == DeviceType::Cpu && index != 0 {
                return Err(Error::new(ErrorKind::Construction)
                    .with_message(format!("cpu device index must be zero, got {index}")));
            }
        }
        Ok(Self { kind, index })
    }

    pub fn kind(&self) -> DeviceType {
        self.kind
    }

    pub fn index(&self) -> Option<i8> {
        self.index
    }

    pub fn is_cpu(&self) -> bool {
        self.kind == DeviceType::Cpu
    }

    /// Fails unless the reference engine can run kernels on this device.
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_cpu() {
            return Ok(());
        }
        Err(Error::new(ErrorKind::Compute)
            .with_message(format!("device unavailable: {self} (only cpu executes)")))
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::CPU
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(descriptor: &str) -> Result<Self> {
        let invalid = || {
            Error::new(ErrorKind::Construction).with_message(format!(
                "invalid device string '{descriptor}': expected one of cpu, cuda, mps, meta with an optional ':<index>'"
            ))
        };
        let (name, index) = match descriptor.split_once(':') {
            Some((name, index)) => (name, Some(index)),
            None => (descriptor, None),
        };
        let kind = DeviceType::parse(name).ok_or_else(invalid)?;
        let index = match index {
            None => None,
            Some(raw) => {
                if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                Some(raw.parse::<i8>().map_err(|err| invalid().with_source(err))?)
            }
        };
        Device::new(kind, index)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        if let Some(index) = self.index {
            write!(f, ":{index}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Device, DeviceType};
    use crate::core::error::ErrorKind;

    #[test]
    fn parses_plain_and_indexed_descriptors() {
        let cpu: Device = "cpu".parse().expect("cpu");
        assert_eq!(cpu, Device::CPU);
        let cuda: Device = "cuda:1".parse().expect("cuda:1");
        assert_eq!(cuda.kind(), DeviceType::Cuda);
        assert_eq!(cuda.index(), Some(1));
        assert_eq!(cuda.to_string(), "cuda:1");
        assert_eq!("meta".parse::<Device>().expect("meta").to_string(), "meta");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for bad in ["", "gpu", "cuda:", "cuda:-1", "cuda:x", "cpu:1", "CPU", "cuda:0:1", "cuda:999"] {
            let err = bad.parse::<Device>().expect_err(bad);
            assert_eq!(err.kind(), ErrorKind::Construction, "{bad}");
        }
    }

    #[test]
    fn only_cpu_is_available() {
        assert!(Device::CPU.ensure_available().is_ok());
        let cuda: Device = "cuda".parse().expect("cuda");
        let err = cuda.ensure_available().expect_err("cuda unavailable");
        assert_eq!(err.kind(), ErrorKind::Compute);
        assert!(err.to_string().contains("device unavailable"));
    }
}
