//! Per-face egress limiting
//!
//! An [`EgressLimiter`] owns one [`TokenBucket`] per content prefix for a
//! single outgoing face. Buckets are sized from the face's estimated link
//! rate: the generation rate is the number of request/response exchanges the
//! link can carry per fill interval, and each bucket holds five intervals
//! worth of tokens (at least two).
//!
//! Refilling uses water-filling: the tokens generated in one interval are
//! split evenly across the buckets that are not full, overflow is collected
//! and split again among the buckets still not full, until nothing is left
//! or every bucket is full.

use std::collections::HashMap;

use tracing::trace;

use saf_core::{ConfigError, ContentPrefix, FaceId};

use crate::config::LimiterConfig;
use crate::token_bucket::TokenBucket;

/// Admission control for one outgoing face
#[derive(Debug, Clone)]
pub struct EgressLimiter {
    face: FaceId,
    /// Tokens generated per fill interval; `None` means unlimited
    generation_rate: Option<f64>,
    /// Bucket every new prefix starts from
    template: Option<TokenBucket>,
    nack_credit: f64,
    buckets: HashMap<ContentPrefix, TokenBucket>,
}

impl EgressLimiter {
    /// Create a limiter for a face with the given link rate (bits/sec)
    ///
    /// An unknown link rate yields an unlimited limiter.
    pub fn new(
        face: FaceId,
        link_rate: Option<u64>,
        config: &LimiterConfig,
    ) -> Result<Self, ConfigError> {
        let Some(bits_per_sec) = link_rate else {
            return Ok(Self::unlimited(face));
        };
        let generation_rate = config.generation_rate(bits_per_sec);
        let template = TokenBucket::primed(config.bucket_capacity(generation_rate))?;
        Ok(Self {
            face,
            generation_rate: Some(generation_rate),
            template: Some(template),
            nack_credit: config.nack_credit,
            buckets: HashMap::new(),
        })
    }

    /// A limiter that admits everything (local faces, unknown link rates)
    pub fn unlimited(face: FaceId) -> Self {
        Self {
            face,
            generation_rate: None,
            template: None,
            nack_credit: 0.0,
            buckets: HashMap::new(),
        }
    }

    pub fn face(&self) -> FaceId {
        self.face
    }

    pub fn is_unlimited(&self) -> bool {
        self.generation_rate.is_none()
    }

    /// Tokens generated per fill interval, if limited
    pub fn generation_rate(&self) -> Option<f64> {
        self.generation_rate
    }

    /// Make sure a bucket exists for `prefix`
    pub fn add_prefix(&mut self, prefix: &ContentPrefix) {
        self.bucket_mut(prefix);
    }

    fn bucket_mut(&mut self, prefix: &ContentPrefix) -> Option<&mut TokenBucket> {
        let template = self.template.as_ref()?;
        Some(
            self.buckets
                .entry(prefix.clone())
                .or_insert_with(|| template.clone()),
        )
    }

    /// Try to admit one request for `prefix` on this face
    pub fn try_consume(&mut self, prefix: &ContentPrefix) -> bool {
        match self.bucket_mut(prefix) {
            Some(bucket) => bucket.try_consume(),
            None => true,
        }
    }

    /// Credit part of a token back after a NACK came back on this face
    pub fn on_nack_returned(&mut self, prefix: &ContentPrefix) {
        let credit = self.nack_credit;
        if let Some(bucket) = self.bucket_mut(prefix) {
            bucket.add_tokens(credit);
        }
    }

    /// Distribute one fill interval of tokens across the buckets
    ///
    /// Returns the tokens that could not be placed because every bucket
    /// was full.
    pub fn refill(&mut self) -> f64 {
        let Some(rate) = self.generation_rate else {
            return 0.0;
        };

        let mut rest = rate;
        let mut open: Vec<&mut TokenBucket> =
            self.buckets.values_mut().filter(|b| !b.is_full()).collect();

        while !open.is_empty() && rest > 0.0 {
            let share = rest / open.len() as f64;
            rest = open.iter_mut().map(|bucket| bucket.add_tokens(share)).sum();
            open.retain(|bucket| !bucket.is_full());
        }

        trace!(face = %self.face, leftover = rest, "Refilled egress buckets");
        rest
    }

    /// Current tokens for a prefix, if a bucket exists
    pub fn tokens(&self, prefix: &ContentPrefix) -> Option<f64> {
        self.buckets.get(prefix).map(TokenBucket::tokens)
    }

    /// Capacity of the bucket for a prefix, if one exists
    pub fn capacity(&self, prefix: &ContentPrefix) -> Option<f64> {
        self.buckets.get(prefix).map(TokenBucket::capacity)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use saf_core::Name;

    use super::*;

    fn face(id: u32) -> FaceId {
        FaceId::new(id).unwrap()
    }

    fn prefix(uri: &str) -> ContentPrefix {
        ContentPrefix::from(&Name::parse(uri).unwrap())
    }

    /// Link rate producing exactly `tokens` per default 10ms fill interval
    fn rate_for(tokens: f64) -> u64 {
        (tokens * 100.0 * 8.0 * 4296.0) as u64
    }

    #[test]
    fn test_unknown_rate_is_unlimited() {
        let mut limiter = EgressLimiter::new(face(1), None, &LimiterConfig::default()).unwrap();
        assert!(limiter.is_unlimited());
        for _ in 0..1000 {
            assert!(limiter.try_consume(&prefix("/a")));
        }
        assert_eq!(limiter.bucket_count(), 0);
        assert_eq!(limiter.refill(), 0.0);
    }

    #[test]
    fn test_bucket_sizing() {
        let config = LimiterConfig::default();

        // Slow link: minimum capacity, primed with one token
        let mut limiter = EgressLimiter::new(face(1), Some(rate_for(0.1)), &config).unwrap();
        limiter.add_prefix(&prefix("/a"));
        assert_eq!(limiter.capacity(&prefix("/a")), Some(2.0));
        assert_eq!(limiter.tokens(&prefix("/a")), Some(1.0));

        // Fast link: five fill intervals of tokens, primed half full
        let mut limiter = EgressLimiter::new(face(2), Some(rate_for(4.0)), &config).unwrap();
        limiter.add_prefix(&prefix("/a"));
        let capacity = limiter.capacity(&prefix("/a")).unwrap();
        assert!((capacity - 20.0).abs() < 1e-6);
        assert!((limiter.tokens(&prefix("/a")).unwrap() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_admission_denied_when_empty() {
        let config = LimiterConfig::default();
        let mut limiter = EgressLimiter::new(face(1), Some(rate_for(0.1)), &config).unwrap();
        let p = prefix("/a");

        // Primed with a single token
        assert!(limiter.try_consume(&p));
        assert!(!limiter.try_consume(&p));

        // Two NACK credits make a whole token
        limiter.on_nack_returned(&p);
        assert!(!limiter.try_consume(&p));
        limiter.on_nack_returned(&p);
        assert!(limiter.try_consume(&p));
    }

    #[test]
    fn test_water_filling_redistributes_overflow() {
        // 3 tokens per interval, capacity 15 per bucket, primed with 7.5
        let config = LimiterConfig::default();
        let mut limiter = EgressLimiter::new(face(1), Some(rate_for(3.0)), &config).unwrap();
        let (a, b) = (prefix("/a"), prefix("/b"));
        limiter.add_prefix(&a);
        limiter.add_prefix(&b);

        // Four even refills bring /a to 13.5 while /b keeps being drained
        for _ in 0..4 {
            while limiter.try_consume(&b) {}
            limiter.refill();
        }
        limiter.on_nack_returned(&a);
        while limiter.try_consume(&b) {}
        assert!((limiter.tokens(&a).unwrap() - 14.0).abs() < 1e-9);
        let b_before = limiter.tokens(&b).unwrap();

        // /a takes 1.0 of its 1.5 share, the 0.5 overflow goes to /b
        let leftover = limiter.refill();
        assert_eq!(leftover, 0.0);
        assert!((limiter.tokens(&a).unwrap() - 15.0).abs() < 1e-9);
        assert!((limiter.tokens(&b).unwrap() - b_before - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_refill_with_all_full_returns_everything() {
        let config = LimiterConfig::default();
        let mut limiter = EgressLimiter::new(face(1), Some(rate_for(2.0)), &config).unwrap();
        let p = prefix("/a");
        limiter.add_prefix(&p);
        for _ in 0..100 {
            limiter.refill();
        }
        assert!(limiter.tokens(&p).unwrap() <= limiter.capacity(&p).unwrap());
        let leftover = limiter.refill();
        assert!((leftover - limiter.generation_rate().unwrap()).abs() < 1e-9);
    }
}
