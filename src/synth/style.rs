//! Reply styles
//!
//! A style picks how long a reply may grow and how adventurous sampling is.
//! Short replies dominate; medium and long ones are rare excursions.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::{Error, Result};

/// Target reply length category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    Short,
    Medium,
    Long,
}

impl Style {
    /// All styles in weight-table order
    pub const ALL: [Self; 3] = [Self::Short, Self::Medium, Self::Long];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

/// Sampling profile for one style
#[derive(Debug, Clone, PartialEq)]
pub struct StyleProfile {
    /// Relative probability of choosing this style
    pub weight: f64,
    /// Smallest token increment (inclusive)
    pub min_tokens: u32,
    /// Largest token increment (inclusive)
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl StyleProfile {
    /// Draw a target length from this profile's range
    pub fn target_length<R: Rng>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min_tokens..=self.max_tokens)
    }
}

/// Profiles for every style
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTable {
    pub short: StyleProfile,
    pub medium: StyleProfile,
    pub long: StyleProfile,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self {
            short: StyleProfile {
                weight: 0.85,
                min_tokens: 10,
                max_tokens: 30,
                temperature: 0.6,
            },
            medium: StyleProfile {
                weight: 0.12,
                min_tokens: 31,
                max_tokens: 60,
                temperature: 0.8,
            },
            long: StyleProfile {
                weight: 0.03,
                min_tokens: 61,
                max_tokens: 120,
                temperature: 1.0,
            },
        }
    }
}

impl StyleTable {
    /// Profile for `style`
    #[must_use]
    pub const fn profile(&self, style: Style) -> &StyleProfile {
        match style {
            Style::Short => &self.short,
            Style::Medium => &self.medium,
            Style::Long => &self.long,
        }
    }

    /// Pick a style by weighted random choice
    ///
    /// Falls back to `Short` if the weights cannot form a distribution.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> Style {
        let weights = Style::ALL.map(|s| self.profile(s).weight);
        match WeightedIndex::new(weights) {
            Ok(dist) => Style::ALL[dist.sample(rng)],
            Err(e) => {
                tracing::warn!(error = %e, "invalid style weights, using short");
                Style::Short
            }
        }
    }

    /// Check that ranges are well formed and disjoint and weights usable
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found
    pub fn validate(&self) -> Result<()> {
        let mut total = 0.0;
        for style in Style::ALL {
            let p = self.profile(style);
            if !p.weight.is_finite() || p.weight < 0.0 {
                return Err(Error::Config(format!(
                    "{} style weight must be a non-negative number",
                    style.as_str()
                )));
            }
            if p.min_tokens == 0 || p.min_tokens > p.max_tokens {
                return Err(Error::Config(format!(
                    "{} style token range {}..={} is empty",
                    style.as_str(),
                    p.min_tokens,
                    p.max_tokens
                )));
            }
            if p.temperature.is_nan() || p.temperature <= 0.0 {
                return Err(Error::Config(format!(
                    "{} style temperature must be positive",
                    style.as_str()
                )));
            }
            total += p.weight;
        }

        if total <= 0.0 {
            return Err(Error::Config("style weights sum to zero".to_string()));
        }

        if self.short.max_tokens >= self.medium.min_tokens
            || self.medium.max_tokens >= self.long.min_tokens
        {
            return Err(Error::Config(
                "style token ranges must be disjoint and increasing".to_string(),
            ));
        }

        Ok(())
    }
}
