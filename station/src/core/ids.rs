//! Unique identifiers for outcomes.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};

/// Generates `<prefix>_<unix-nanos>_<sequence>_<suffix>` identifiers.
///
/// The per-instance sequence makes ids unique even when many callers land on
/// the same clock tick; the random suffix keeps ids from separate processes apart.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    sequence: AtomicU64,
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("{}_{nanos}_{seq}_{}", self.prefix, random_suffix())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new("tofu")
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}
