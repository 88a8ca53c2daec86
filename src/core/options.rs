// Tensor construction options: an immutable builder, every setter returns a new value.
use crate::core::device::Device;
use crate::core::dtype::Dtype;
use crate::core::error::{Error, ErrorKind, Result};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(i8)]
pub enum Layout {
    #[default]
    Strided = 0,
    Sparse = 1,
    Mkldnn = 2,
}

impl Layout {
    pub fn from_code(code: i8) -> Result<Self> {
        match code {
            0 => Ok(Layout::Strided),
            1 => Ok(Layout::Sparse),
            2 => Ok(Layout::Mkldnn),
            _ => Err(Error::new(ErrorKind::Construction)
                .with_message(format!("unknown layout code {code}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[repr(i8)]
pub enum MemoryFormat {
    #[default]
    Contiguous = 0,
    Preserve = 1,
    ChannelsLast = 2,
    ChannelsLast3d = 3,
}

impl MemoryFormat {
    pub fn from_code(code: i8) -> Result<Self> {
        match code {
            0 => Ok(MemoryFormat::Contiguous),
            1 => Ok(MemoryFormat::Preserve),
            2 => Ok(MemoryFormat::ChannelsLast),
            3 => Ok(MemoryFormat::ChannelsLast3d),
            _ => Err(Error::new(ErrorKind::Construction)
                .with_message(format!("unknown memory format code {code}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TensorOptions {
    pub dtype: Dtype,
    pub layout: Layout,
    pub memory_format: MemoryFormat,
    pub device: Device,
    pub requires_grad: bool,
    pub pinned_memory: bool,
}

impl Default for TensorOptions {
    fn default() -> Self {
        Self {
            dtype: Dtype::Float,
            layout: Layout::Strided,
            memory_format: MemoryFormat::Contiguous,
            device: Device::CPU,
            requires_grad: false,
            pinned_memory: false,
        }
    }
}

impl TensorOptions {
    pub fn with_dtype(self, dtype: Dtype) -> Self {
        Self { dtype, ..self }
    }

    pub fn with_layout(self, layout: Layout) -> Self {
        Self { layout, ..self }
    }

    pub fn with_memory_format(self, memory_format: MemoryFormat) -> Self {
        Self {
            memory_format,
            ..self
        }
    }

    pub fn with_device(self, device: Device) -> Self {
        Self { device, ..self }
    }

    pub fn with_requires_grad(self, requires_grad: bool) -> Self {
        Self {
            requires_grad,
            ..self
        }
    }

    pub fn with_pinned_memory(self, pinned_memory: bool) -> Self {
        Self {
            pinned_memory,
            ..self
        }
    }

    /// Checks the options describe something the engine can allocate.
    pub fn validate_for_creation(&self) -> Result<()> {
        self.dtype.ensure_supported()?;
        if self.layout != Layout::Strided {
            return Err(Error::unsupported(format!(
                "layout {:?} is not supported for tensor creation",
                self.layout
            )));
        }
        if self.pinned_memory {
            return Err(Error::unsupported("pinned memory requires an accelerator"));
        }
        if self.requires_grad && !self.dtype.is_floating_point() && !self.dtype.is_complex() {
            return Err(Error::new(ErrorKind::Construction).with_message(format!(
                "only floating point and complex tensors can require gradients, got {}",
                self.dtype
            )));
        }
        self.device.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_leave_the_source_untouched() {
        let base = TensorOptions::default();
        let derived = base.with_dtype(Dtype::Double).with_requires_grad(true);
        assert_eq!(base.dtype, Dtype::Float);
        assert!(!base.requires_grad);
        assert_eq!(derived.dtype, Dtype::Double);
        assert!(derived.requires_grad);
    }

    #[test]
    fn creation_rejects_what_the_engine_cannot_allocate() {
        let sparse = TensorOptions::default().with_layout(Layout::Sparse);
        assert_eq!(
            sparse.validate_for_creation().expect_err("sparse").kind(),
            ErrorKind::Unsupported
        );
        let int_grad = TensorOptions::default()
            .with_dtype(Dtype::Long)
            .with_requires_grad(true);
        assert_eq!(
            int_grad.validate_for_creation().expect_err("int grad").kind(),
            ErrorKind::Construction
        );
        let cuda = TensorOptions::default().with_device("cuda".parse().expect("cuda"));
        assert_eq!(
            cuda.validate_for_creation().expect_err("cuda").kind(),
            ErrorKind::Compute
        );
        assert!(TensorOptions::default().validate_for_creation().is_ok());
    }

    #[test]
    fn layout_and_format_codes_are_checked() {
        assert_eq!(Layout::from_code(2).expect("mkldnn"), Layout::Mkldnn);
        assert!(Layout::from_code(9).is_err());
        assert_eq!(
            MemoryFormat::from_code(2).expect("channels last"),
            MemoryFormat::ChannelsLast
        );
        assert!(MemoryFormat::from_code(-1).is_err());
    }
}
