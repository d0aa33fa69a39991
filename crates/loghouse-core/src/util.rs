//! Small time and randomness helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Current wall-clock time in milliseconds since epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}

/// Produces a random string of lowercase ASCII letters.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_string_has_requested_length() {
        assert_eq!(random_string(0).len(), 0);
        assert_eq!(random_string(7).len(), 7);
    }
}
