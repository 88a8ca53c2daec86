//! Purpose: Process-wide runtime settings and logging setup.
//! Exports: grad-mode, thread-count and seed accessors, `init_logging`.
//! Role: Global configuration read by the engine and exported through the runtime ABI.
//! Invariants: Settings are atomics, so access is memory-safe but unordered across threads.
//! Invariants: Environment overrides (`CTENSOR_SEED`, `CTENSOR_NUM_THREADS`) apply once, on first use.
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use tracing_subscriber::EnvFilter;

use crate::core::random;

pub const LOG_ENV: &str = "CTENSOR_LOG";
pub const SEED_ENV: &str = "CTENSOR_SEED";
pub const NUM_THREADS_ENV: &str = "CTENSOR_NUM_THREADS";

static GRAD_ENABLED: AtomicBool = AtomicBool::new(true);
static NUM_THREADS: AtomicI32 = AtomicI32::new(0);
static ENV_DEFAULTS: Once = Once::new();

pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.load(Ordering::Relaxed)
}

pub fn set_grad_enabled(enabled: bool) {
    GRAD_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn num_threads() -> i32 {
    apply_env_defaults();
    NUM_THREADS.load(Ordering::Relaxed)
}

/// Non-positive counts are ignored.
pub fn set_num_threads(count: i32) -> bool {
    apply_env_defaults();
    if count <= 0 {
        tracing::warn!(count, "ignoring non-positive thread count");
        return false;
    }
    NUM_THREADS.store(count, Ordering::Relaxed);
    true
}

pub fn manual_seed(seed: u64) {
    apply_env_defaults();
    random::reseed(seed);
}

fn apply_env_defaults() {
    ENV_DEFAULTS.call_once(|| {
        let threads = std::env::var(NUM_THREADS_ENV)
            .ok()
            .and_then(|raw| match raw.trim().parse::<i32>() {
                Ok(value) if value > 0 => Some(value),
                _ => {
                    tracing::warn!(value = %raw, "ignoring invalid {NUM_THREADS_ENV}");
                    None
                }
            })
            .unwrap_or_else(default_threads);
        NUM_THREADS.store(threads, Ordering::Relaxed);

        if let Ok(raw) = std::env::var(SEED_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(seed) => random::reseed(seed),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid {SEED_ENV}"),
            }
        }
    });
}

fn default_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|count| i32::try_from(count.get()).unwrap_or(i32::MAX))
        .unwrap_or(1)
}

/// Installs a stderr subscriber filtered by `CTENSOR_LOG` (default `warn`).
/// Returns false when a global subscriber was already set.
pub fn init_logging() -> bool {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Seeds the generator from the environment before its first draw.
pub(crate) fn ensure_initialized() {
    apply_env_defaults();
}
