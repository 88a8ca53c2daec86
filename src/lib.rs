//! Purpose: C-callable tensor library: error channel, opaque handles, dynamic value codec.
//! Exports: `abi` (the `ctn_*` C surface), `core` (reference CPU engine), `config` (runtime settings).
//! Role: Built as rlib, cdylib and staticlib; C callers include `include/ctensor.h`.
//! Invariants: No panic or Rust error crosses `extern "C"`; failures come back as Diagnostic strings.
//! Invariants: Every handle has exactly one allocation path and one matching free function.
pub mod abi;
pub mod config;
pub mod core;
