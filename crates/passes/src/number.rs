use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const BLOCK: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Human-legible pass identifier: `PASS-<last 6 digits of epoch millis>-<6 random alphanumerics>`.
///
/// Uniqueness is enforced by the store; generation only makes collisions rare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassNumber(String);

impl PassNumber {
    pub fn generate(now: DateTime<Utc>, rng: &mut impl Rng) -> Self {
        let millis = now.timestamp_millis().rem_euclid(1_000_000);
        let block: String = (0..6)
            .map(|_| BLOCK[rng.random_range(0..BLOCK.len())] as char)
            .collect();
        Self(format!("PASS-{millis:06}-{block}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for PassNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn number_has_timestamp_suffix_and_random_block() {
        let now = Utc.timestamp_millis_opt(1_700_000_012_345).unwrap();
        let n = PassNumber::generate(now, &mut StdRng::seed_from_u64(7));
        let parts: Vec<&str> = n.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PASS");
        assert_eq!(parts[1], "012345");
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].bytes().all(|b| BLOCK.contains(&b)));
    }

    #[test]
    fn same_millisecond_numbers_differ() {
        let now = Utc::now();
        let mut rng = rand::rng();
        let a = PassNumber::generate(now, &mut rng);
        let b = PassNumber::generate(now, &mut rng);
        assert_ne!(a, b);
    }
}
