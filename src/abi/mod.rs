//! Purpose: The C ABI exported by this crate.
//! Exports: every `ctn_*` symbol plus the opaque handle types.
//! Role: Boundary only; all semantics live in `core` and `config`.
//! Invariants: Every fallible export returns null on success or a malloc'd Diagnostic on failure.
//! Invariants: Output parameters are written only on success.
pub mod buffer;
pub mod device;
pub mod diagnostic;
pub mod functions;
pub mod handle;
pub mod module;
pub mod options;
pub mod runtime;
pub mod tensor;
pub mod value;
