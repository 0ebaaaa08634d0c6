//! Token bucket admission counter
//!
//! Tokens are fractional: the egress limiter credits partial tokens on every
//! fill tick and on returned NACKs. Admitting a request costs one whole token.

use saf_core::ConfigError;

/// Fraction of the capacity a fresh bucket starts with
pub const INITIAL_FILL: f64 = 0.5;

/// A single admission-control counter with a fixed capacity
///
/// Invariant: `0 <= tokens <= capacity` after every operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
}

impl TokenBucket {
    /// Create an empty bucket
    ///
    /// Fails with [`ConfigError::NonPositiveCapacity`] unless `capacity > 0`.
    pub fn new(capacity: f64) -> Result<Self, ConfigError> {
        Self::check_capacity(capacity)?;
        Ok(Self {
            tokens: 0.0,
            capacity,
        })
    }

    /// Create a bucket pre-filled with `max(1, capacity * INITIAL_FILL)` tokens
    pub fn primed(capacity: f64) -> Result<Self, ConfigError> {
        let mut bucket = Self::new(capacity)?;
        bucket.add_tokens((capacity * INITIAL_FILL).max(1.0));
        Ok(bucket)
    }

    fn check_capacity(capacity: f64) -> Result<(), ConfigError> {
        if capacity > 0.0 && capacity.is_finite() {
            Ok(())
        } else {
            Err(ConfigError::NonPositiveCapacity(capacity))
        }
    }

    /// Add tokens, returning whatever did not fit
    pub fn add_tokens(&mut self, amount: f64) -> f64 {
        if amount <= 0.0 || amount.is_nan() {
            return 0.0;
        }
        self.tokens += amount;
        if self.tokens > self.capacity {
            let overflow = self.tokens - self.capacity;
            self.tokens = self.capacity;
            overflow
        } else {
            0.0
        }
    }

    /// Take one token if at least one is available
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn is_full(&self) -> bool {
        self.tokens >= self.capacity
    }

    /// Resize the bucket, discarding tokens above the new capacity
    pub fn set_capacity(&mut self, capacity: f64) -> Result<(), ConfigError> {
        Self::check_capacity(capacity)?;
        self.capacity = capacity;
        self.tokens = self.tokens.min(capacity);
        Ok(())
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}
