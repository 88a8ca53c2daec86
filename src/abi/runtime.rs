// Process-wide runtime settings, logging setup and version reporting.
use std::os::raw::c_char;

use crate::abi::diagnostic::try_catch;
use crate::config;
use crate::core::error::{Error, ErrorKind};

/// Installs the stderr log subscriber; false when one was already installed.
#[unsafe(no_mangle)]
pub extern "C" fn ctn_init_logging() -> bool {
    config::init_logging()
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_manual_seed(seed: u64) {
    config::manual_seed(seed);
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_set_grad_enabled(enabled: bool) {
    config::set_grad_enabled(enabled);
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_is_grad_enabled() -> bool {
    config::is_grad_enabled()
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_set_num_threads(count: i32) -> *mut c_char {
    try_catch(|| {
        if !config::set_num_threads(count) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("thread count must be positive, got {count}")));
        }
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_get_num_threads() -> i32 {
    config::num_threads()
}

fn version_part(raw: &str) -> i32 {
    raw.parse().unwrap_or(0)
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_version_major() -> i32 {
    version_part(env!("CARGO_PKG_VERSION_MAJOR"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_version_minor() -> i32 {
    version_part(env!("CARGO_PKG_VERSION_MINOR"))
}

#[unsafe(no_mangle)]
pub extern "C" fn ctn_version_patch() -> i32 {
    version_part(env!("CARGO_PKG_VERSION_PATCH"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_manifest() {
        let version = format!("{}.{}.{}", ctn_version_major(), ctn_version_minor(), ctn_version_patch());
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn non_positive_thread_count_is_rejected() {
        let before = ctn_get_num_threads();
        let diagnostic = ctn_set_num_threads(0);
        assert!(!diagnostic.is_null());
        crate::abi::diagnostic::ctn_diagnostic_free(diagnostic);
        assert_eq!(ctn_get_num_threads(), before);
    }
}
