// Reference CPU engine: storage, element types, kernels, codecs and dynamic values.
pub mod device;
pub mod dtype;
pub mod error;
pub mod format;
pub mod module;
pub mod ops;
pub mod options;
pub mod random;
pub mod shape;
pub mod tensor;
pub mod value;
