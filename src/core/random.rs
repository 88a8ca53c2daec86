// Process-wide pseudo random generator behind rand/randn/randint.
use std::sync::Mutex;

use crate::config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::tensor::try_collect;

static GENERATOR: Mutex<Option<Generator>> = Mutex::new(None);

/// xorshift64* seeded through splitmix64.
#[derive(Clone, Debug)]
pub struct Generator {
    state: u64,
}

impl Generator {
    pub fn new(seed: u64) -> Self {
        let mut mixed = splitmix64(seed);
        if mixed == 0 {
            mixed = 0x9e37_79b9_7f4a_7c15;
        }
        Self { state: mixed }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    pub fn next_normal(&mut self) -> f64 {
        // Box-Muller; `1 - u` keeps the log argument in (0, 1].
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Uniform in [low, high).
    pub fn next_in_range(&mut self, low: i64, high: i64) -> i64 {
        let span = high.wrapping_sub(low) as u64;
        low.wrapping_add((self.next_u64() % span) as i64)
    }
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

pub fn reseed(seed: u64) {
    let mut guard = GENERATOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Some(Generator::new(seed));
}

fn with_generator<T>(f: impl FnOnce(&mut Generator) -> T) -> Result<T> {
    config::ensure_initialized();
    let mut guard = GENERATOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if guard.is_none() {
        let mut seed = [0u8; 8];
        getrandom::fill(&mut seed).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("failed to seed random generator: {err}"))
        })?;
        *guard = Some(Generator::new(u64::from_ne_bytes(seed)));
    }
    match guard.as_mut() {
        Some(generator) => Ok(f(generator)),
        None => Err(Error::new(ErrorKind::Internal).with_message("random generator unavailable")),
    }
}

pub fn uniform(count: usize) -> Result<Vec<f64>> {
    with_generator(|g| try_collect(count, (0..count).map(|_| g.next_f64())))?
}

pub fn normal(count: usize) -> Result<Vec<f64>> {
    with_generator(|g| try_collect(count, (0..count).map(|_| g.next_normal())))?
}

pub fn integers(count: usize, low: i64, high: i64) -> Result<Vec<i64>> {
    if low >= high {
        return Err(Error::new(ErrorKind::Compute)
            .with_message(format!("random_ expects 'from' to be less than 'to', but got from={low} >= to={high}")));
    }
    with_generator(|g| try_collect(count, (0..count).map(|_| g.next_in_range(low, high))))?
}

#[cfg(test)]
mod tests {
    use super::Generator;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Generator::new(42);
        let mut b = Generator::new(42);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        assert_ne!(Generator::new(1).next_u64(), Generator::new(2).next_u64());
    }

    #[test]
    fn draws_stay_in_range() {
        let mut g = Generator::new(7);
        for _ in 0..1000 {
            let u = g.next_f64();
            assert!((0.0..1.0).contains(&u));
            let i = g.next_in_range(-3, 5);
            assert!((-3..5).contains(&i));
            assert!(g.next_normal().is_finite());
        }
    }
}
