//! Measures: how delivered responses are judged
//!
//! Every prefix entry uses one [`MeasureKind`] to decide whether a returned
//! response counts as satisfied. A response that fails the measure is
//! accounted like an expiry on every face the request went out on.
//!
//! The [`MeasureRegistry`] picks a measure for a prefix by component-wise
//! longest-prefix match over the configured [`MeasureRule`]s.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use saf_core::{Delivery, Name};

/// Default round-trip bound for [`MeasureKind::Delay`]
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(1000);

/// Default hop bound for [`MeasureKind::Hops`]
pub const DEFAULT_MAX_HOPS: u32 = 10;

/// Rule turning a delivered response into a satisfied/unsatisfied count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasureKind {
    /// Every delivered response counts as satisfied
    #[default]
    Ratio,
    /// Satisfied only when the round trip stays within `max_delay`
    Delay { max_delay: Duration },
    /// Satisfied only when the response travelled at most `max_hops`
    Hops { max_hops: u32 },
}

impl MeasureKind {
    /// Delay measure with the default bound
    pub fn delay() -> Self {
        Self::Delay {
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Hop-count measure with the default bound
    pub fn hops() -> Self {
        Self::Hops {
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    /// Check whether a delivery satisfies this measure
    ///
    /// A delivery missing the observation a measure needs is accepted.
    pub fn accepts(&self, delivery: &Delivery) -> bool {
        match self {
            Self::Ratio => true,
            Self::Delay { max_delay } => delivery.rtt.is_none_or(|rtt| rtt <= *max_delay),
            Self::Hops { max_hops } => delivery.hop_count.is_none_or(|hops| hops <= *max_hops),
        }
    }
}

/// Binds a measure to every prefix under `prefix`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureRule {
    /// Name prefix in URI form, e.g. `/video`
    pub prefix: String,
    pub kind: MeasureKind,
}

impl MeasureRule {
    pub fn new(prefix: impl Into<String>, kind: MeasureKind) -> Self {
        Self {
            prefix: prefix.into(),
            kind,
        }
    }
}

/// Resolves the measure for a content prefix
#[derive(Debug, Clone, Default)]
pub struct MeasureRegistry {
    rules: Vec<(Name, MeasureKind)>,
    default_kind: MeasureKind,
}

impl MeasureRegistry {
    /// Build a registry; rules whose prefix does not parse are skipped
    pub fn new(rules: &[MeasureRule], default_kind: MeasureKind) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match Name::parse(&rule.prefix) {
                Ok(name) => Some((name, rule.kind)),
                Err(e) => {
                    tracing::warn!(prefix = %rule.prefix, error = %e, "Ignoring measure rule");
                    None
                }
            })
            .collect();
        Self {
            rules,
            default_kind,
        }
    }

    /// Longest matching rule for `name`, or the default measure
    pub fn resolve(&self, name: &Name) -> MeasureKind {
        self.rules
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, kind)| *kind)
            .unwrap_or(self.default_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::parse(uri).unwrap()
    }

    #[test]
    fn test_ratio_accepts_everything() {
        assert!(MeasureKind::Ratio.accepts(&Delivery::default()));
        assert!(MeasureKind::Ratio.accepts(&Delivery::with_rtt(Duration::from_secs(60))));
    }

    #[test]
    fn test_delay_bound() {
        let measure = MeasureKind::Delay {
            max_delay: Duration::from_millis(200),
        };
        assert!(measure.accepts(&Delivery::with_rtt(Duration::from_millis(200))));
        assert!(!measure.accepts(&Delivery::with_rtt(Duration::from_millis(201))));
        assert!(measure.accepts(&Delivery::default()));
    }

    #[test]
    fn test_hop_bound() {
        let measure = MeasureKind::hops();
        assert!(measure.accepts(&Delivery::with_hops(10)));
        assert!(!measure.accepts(&Delivery::with_hops(11)));
    }

    #[test]
    fn test_registry_longest_match() {
        let rules = vec![
            MeasureRule::new("/", MeasureKind::hops()),
            MeasureRule::new("/video", MeasureKind::delay()),
            MeasureRule::new("/video/live", MeasureKind::Ratio),
        ];
        let registry = MeasureRegistry::new(&rules, MeasureKind::Ratio);

        assert_eq!(registry.resolve(&name("/video/vod")), MeasureKind::delay());
        assert_eq!(registry.resolve(&name("/video/live/x")), MeasureKind::Ratio);
        assert_eq!(registry.resolve(&name("/audio")), MeasureKind::hops());
    }

    #[test]
    fn test_registry_matches_whole_components() {
        let rules = vec![MeasureRule::new("/vid", MeasureKind::delay())];
        let registry = MeasureRegistry::new(&rules, MeasureKind::Ratio);

        assert_eq!(registry.resolve(&name("/video")), MeasureKind::Ratio);
        assert_eq!(registry.resolve(&name("/vid/a")), MeasureKind::delay());
    }

    #[test]
    fn test_registry_skips_bad_rules() {
        let rules = vec![MeasureRule::new("relative", MeasureKind::delay())];
        let registry = MeasureRegistry::new(&rules, MeasureKind::hops());
        assert_eq!(registry.resolve(&name("/relative")), MeasureKind::hops());
    }
}
