use rand::{distributions::Alphanumeric, Rng};

/// Source of unguessable identifiers for OAuth `state` values and session ids.
pub trait NonceSource: Send + Sync + 'static {
    fn generate(&self) -> String;
}

const NONCE_LEN: usize = 43;

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNonceSource;

impl NonceSource for RandomNonceSource {
    fn generate(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_nonces_are_long_and_distinct() {
        let source = RandomNonceSource;
        let a = source.generate();
        let b = source.generate();

        assert_eq!(a.len(), NONCE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
