//! Credential pool with round-robin rotation

/// Ordered, duplicate-free set of interchangeable API keys and a cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialPool {
    tokens: Vec<String>,
    index: usize,
}

impl CredentialPool {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut pool = Self::default();
        for token in tokens {
            pool.add(token);
        }
        pool
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&str> {
        self.tokens.get(self.index).map(String::as_str)
    }

    /// Advance to the next key, wrapping around. No-op on an empty pool.
    pub fn rotate(&mut self) {
        if self.tokens.is_empty() {
            return;
        }
        self.index = (self.index + 1) % self.tokens.len();
    }

    /// Append a key. Blank and already-known keys are rejected.
    pub fn add(&mut self, token: impl Into<String>) -> bool {
        let token = token.into().trim().to_string();
        if token.is_empty() || self.tokens.contains(&token) {
            return false;
        }
        self.tokens.push(token);
        true
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(tokens: &[&str]) -> CredentialPool {
        CredentialPool::new(tokens.iter().map(|t| t.to_string()))
    }

    #[test]
    fn rotating_pool_size_times_returns_to_start() {
        for size in 1..6 {
            let tokens: Vec<String> = (0..size).map(|i| format!("key-{}", i)).collect();
            let mut pool = CredentialPool::new(tokens);
            pool.rotate();
            let start = pool.index();
            for _ in 0..size {
                pool.rotate();
            }
            assert_eq!(pool.index(), start);
        }
    }

    #[test]
    fn rotation_wraps_in_insertion_order() {
        let mut pool = pool(&["A", "B", "C"]);
        assert_eq!(pool.current(), Some("A"));
        pool.rotate();
        assert_eq!(pool.current(), Some("B"));
        pool.rotate();
        pool.rotate();
        assert_eq!(pool.current(), Some("A"));
    }

    #[test]
    fn empty_pool_is_inert() {
        let mut pool = CredentialPool::default();
        pool.rotate();
        assert_eq!(pool.index(), 0);
        assert_eq!(pool.current(), None);
    }

    #[test]
    fn add_keeps_the_current_key() {
        let mut pool = pool(&["A", "B"]);
        pool.rotate();
        assert!(pool.add("C"));
        assert_eq!(pool.current(), Some("B"));
        assert!(!pool.add("A"));
        assert!(!pool.add("   "));
        assert_eq!(pool.len(), 3);
    }
}
