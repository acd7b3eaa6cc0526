//! Randomized A/B cohort assignment.

use onboarding_core::types::{AbGroup, CohortAssignment, OnboardingRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Assigns each onboarding user to control with a fixed probability.
#[derive(Debug, Clone)]
pub struct CohortAssigner {
    control_fraction: f64,
}

impl CohortAssigner {
    pub fn new(control_fraction: f64) -> Self {
        Self { control_fraction }
    }

    /// Build the random source for a run. A missing seed falls back to
    /// entropy, which makes the run non-reproducible.
    pub fn rng(seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => {
                info!(seed, "Cohort assignment seeded");
                StdRng::seed_from_u64(seed)
            }
            None => {
                warn!("Cohort assignment unseeded, run is not reproducible");
                StdRng::from_entropy()
            }
        }
    }

    /// Draw one value per distinct user, in ascending `user_id` order, and
    /// assign control when it is `<= control_fraction`.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        onboarding: &[OnboardingRecord],
        rng: &mut R,
    ) -> Vec<CohortAssignment> {
        let users: BTreeSet<&str> = onboarding.iter().map(|r| r.user_id.as_str()).collect();

        users
            .into_iter()
            .map(|user_id| {
                let draw: f64 = rng.gen();
                let ab_group = if draw <= self.control_fraction {
                    AbGroup::Control
                } else {
                    AbGroup::Treatment
                };
                CohortAssignment {
                    user_id: user_id.to_string(),
                    ab_group,
                }
            })
            .collect()
    }
}

impl Default for CohortAssigner {
    fn default() -> Self {
        Self::new(0.05)
    }
}
