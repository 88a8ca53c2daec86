//! Purpose: Compiled modules: a JSON archive describing an elementwise forward pipeline.
//! Exports: `CompiledModule`, `Step`, `MODULE_FORMAT`.
//! Role: Engine object behind CompiledModule handles (load/save/flags/forward).
//! Invariants: Archives carry a format tag; unknown tags are rejected as corrupt.
//! Invariants: Forward only runs on an available device and only accepts tensor inputs.
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::device::Device;
use crate::core::dtype::{Dtype, Scalar};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::ops::{self, UnaryOp};
use crate::core::tensor::Tensor;
use crate::core::value::DynamicValue;

pub const MODULE_FORMAT: &str = "ctensor-module/1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Relu,
    Sigmoid,
    Tanh,
    Abs,
    Scale { factor: f64 },
    Shift { offset: f64 },
    Reshape { shape: Vec<i64> },
}

impl Step {
    fn apply(&self, input: &Tensor) -> Result<Tensor> {
        match self {
            Step::Relu => ops::unary(UnaryOp::Relu, input),
            Step::Sigmoid => ops::unary(UnaryOp::Sigmoid, input),
            Step::Tanh => ops::unary(UnaryOp::Tanh, input),
            Step::Abs => ops::unary(UnaryOp::Abs, input),
            Step::Scale { factor } => ops::mul(input, &operand(input, *factor)?),
            Step::Shift { offset } => ops::add(input, &operand(input, *offset)?, 1.0),
            Step::Reshape { shape } => input.reshape(shape),
        }
    }
}

// Scalar operands take the input's dtype so a float32 pipeline stays float32.
fn operand(input: &Tensor, value: f64) -> Result<Tensor> {
    let dtype = if input.dtype().is_floating_point() || input.dtype().is_complex() {
        input.dtype()
    } else {
        Dtype::Float
    };
    Tensor::scalar(Scalar::Float(value), dtype)
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Relu => f.write_str("relu"),
            Step::Sigmoid => f.write_str("sigmoid"),
            Step::Tanh => f.write_str("tanh"),
            Step::Abs => f.write_str("abs"),
            Step::Scale { factor } => write!(f, "scale(factor={factor})"),
            Step::Shift { offset } => write!(f, "shift(offset={offset})"),
            Step::Reshape { shape } => write!(f, "reshape(shape={shape:?})"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Archive {
    format: String,
    name: String,
    #[serde(default)]
    training: bool,
    #[serde(default)]
    optimized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dtype: Option<i8>,
    forward: Vec<Step>,
}

#[derive(Clone, Debug)]
pub struct CompiledModule {
    name: String,
    training: bool,
    optimized: bool,
    dtype: Option<Dtype>,
    device: Device,
    steps: Vec<Step>,
}

impl CompiledModule {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            training: true,
            optimized: true,
            dtype: None,
            device: Device::CPU,
            steps,
        }
    }

    pub fn load(path: &Path, device: Device) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read module archive")
                .with_path(path)
                .with_source(err)
        })?;
        let archive: Archive = serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("invalid module archive")
                .with_path(path)
                .with_source(err)
        })?;
        if archive.format != MODULE_FORMAT {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "unsupported module format '{}' (expected {MODULE_FORMAT})",
                    archive.format
                ))
                .with_path(path));
        }
        let dtype = archive
            .dtype
            .map(Dtype::from_code)
            .transpose()
            .map_err(|err| err.with_path(path))?;
        tracing::debug!(name = %archive.name, steps = archive.forward.len(), %device, "loaded module");
        Ok(Self {
            name: archive.name,
            training: archive.training,
            optimized: archive.optimized,
            dtype,
            device,
            steps: archive.forward,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let archive = Archive {
            format: MODULE_FORMAT.to_string(),
            name: self.name.clone(),
            training: self.training,
            optimized: self.optimized,
            dtype: self.dtype.map(Dtype::code),
            forward: self.steps.clone(),
        };
        let text = serde_json::to_string_pretty(&archive).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode module archive")
                .with_source(err)
        })?;
        fs::write(path, text).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write module archive")
                .with_path(path)
                .with_source(err)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn dtype(&self) -> Option<Dtype> {
        self.dtype
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn set_optimized(&mut self, optimized: bool) {
        self.optimized = optimized;
    }

    pub fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    pub fn eval(&mut self) {
        self.train(false);
    }

    pub fn cast_to(&mut self, dtype: Dtype) -> Result<()> {
        dtype.ensure_supported()?;
        if !dtype.is_floating_point() && !dtype.is_complex() {
            return Err(Error::new(ErrorKind::Compute).with_message(format!(
                "modules can only be cast to floating point or complex dtypes, got {dtype}"
            )));
        }
        self.dtype = Some(dtype);
        Ok(())
    }

    pub fn copy_to(&mut self, device: Device) {
        self.device = device;
    }

    pub fn forward(&self, inputs: &[DynamicValue]) -> Result<DynamicValue> {
        self.device.ensure_available()?;
        if inputs.is_empty() {
            return Err(Error::new(ErrorKind::Compute)
                .with_message(format!("forward of module '{}' expects at least one input", self.name)));
        }
        let mut outputs = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let tensor = input.to_tensor().map_err(|err| {
                Error::new(ErrorKind::TypeMismatch)
                    .with_message(format!("forward input {index} must be a Tensor"))
                    .with_source(err)
            })?;
            outputs.push(DynamicValue::Tensor(self.run(&tensor)?));
        }
        if outputs.len() == 1 {
            return Ok(outputs.remove(0));
        }
        Ok(DynamicValue::from_tuple(outputs))
    }

    fn run(&self, input: &Tensor) -> Result<Tensor> {
        let mut current = match self.dtype {
            Some(dtype) => input.to_dtype(dtype)?,
            None => input.clone(),
        };
        for step in &self.steps {
            current = step.apply(&current)?;
        }
        if let Some(dtype) = self.dtype {
            current = current.to_dtype(dtype)?;
        }
        Ok(current)
    }
}

impl fmt::Display for CompiledModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompiledModule(name={}, training={}, optimized={}, device={}",
            self.name, self.training, self.optimized, self.device
        )?;
        if let Some(dtype) = self.dtype {
            write!(f, ", dtype={dtype}")?;
        }
        f.write_str(")")?;
        for (index, step) in self.steps.iter().enumerate() {
            write!(f, "\n  ({index}): {step}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::TensorOptions;

    fn input(values: &[f64]) -> DynamicValue {
        let scalars: Vec<Scalar> = values.iter().map(|&v| Scalar::Float(v)).collect();
        let tensor = Tensor::from_scalars(&scalars, &[values.len() as i64], &TensorOptions::default())
            .expect("tensor");
        DynamicValue::Tensor(tensor)
    }

    fn values(value: &DynamicValue) -> Vec<f64> {
        value
            .to_tensor()
            .expect("tensor")
            .scalars()
            .expect("scalars")
            .into_iter()
            .map(Scalar::as_f64)
            .collect()
    }

    #[test]
    fn forward_runs_pipeline() {
        let module = CompiledModule::new(
            "affine",
            vec![Step::Relu, Step::Scale { factor: 2.0 }, Step::Shift { offset: 1.0 }],
        );
        let out = module.forward(&[input(&[-1.0, 0.5, 2.0])]).expect("forward");
        assert_eq!(values(&out), vec![1.0, 2.0, 5.0]);

        let pair = module
            .forward(&[input(&[1.0]), input(&[-3.0])])
            .expect("two inputs");
        assert_eq!(pair.tuple_len().expect("tuple"), 2);
    }

    #[test]
    fn forward_rejects_non_tensor_and_unavailable_device() {
        let mut module = CompiledModule::new("id", Vec::new());
        let err = module.forward(&[DynamicValue::Int(1)]).expect_err("int input");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        module.copy_to("cuda:0".parse().expect("device"));
        let err = module.forward(&[input(&[1.0])]).expect_err("cuda");
        assert_eq!(err.kind(), ErrorKind::Compute);
    }

    #[test]
    fn archive_round_trips_flags_and_steps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("module.json");
        let mut module = CompiledModule::new("m", vec![Step::Reshape { shape: vec![-1] }, Step::Tanh]);
        module.eval();
        module.set_optimized(false);
        module.cast_to(Dtype::Double).expect("cast");
        module.save(&path).expect("save");

        let loaded = CompiledModule::load(&path, Device::CPU).expect("load");
        assert!(!loaded.is_training());
        assert!(!loaded.is_optimized());
        assert_eq!(loaded.dtype(), Some(Dtype::Double));
        assert_eq!(loaded.steps(), module.steps());
        assert!(loaded.to_string().contains("(1): tanh"));
    }

    #[test]
    fn load_rejects_foreign_archives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"format":"other/9","name":"x","forward":[]}"#).expect("write");
        let err = CompiledModule::load(&path, Device::CPU).expect_err("format");
        assert_eq!(err.kind(), ErrorKind::Corrupt);

        fs::write(&path, "not json").expect("write");
        assert_eq!(
            CompiledModule::load(&path, Device::CPU).expect_err("parse").kind(),
            ErrorKind::Corrupt
        );
        assert!(CompiledModule::new("m", Vec::new()).cast_to(Dtype::Long).is_err());
    }
}
