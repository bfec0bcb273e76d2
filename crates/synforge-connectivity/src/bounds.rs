// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Probabilistic capacity bounds.

Connectors size fixed on-chip buffers before any connection is drawn. A bound
`k` for a Binomial(n, p) selection count is the smallest value with
`P(X > k) <= failure_chance`; it must never be below the true quantile, since
an undersized buffer silently truncates rows on the device.

Up to `exact_trial_limit` trials the quantile is computed exactly from the
binomial upper tail, summed in log space from the far end. Past the limit a
Bernstein bound is used:

```text
k = ceil(np + L/3 + sqrt(L^2/9 + 2 L np)),   L = ln(1 / failure_chance)
```

which bounds the exact quantile from above, so the result stays monotonic in
both `n` and `p` across the switch.
*/

use serde::{Deserialize, Serialize};

use crate::parameters::ParameterDescriptor;
use crate::types::{ConnectivityError, ConnectivityResult};

/// Chance of a bound being exceeded that the device can tolerate
pub const DEFAULT_FAILURE_CHANCE: f64 = 1e-5;

/// Largest trial count evaluated with the exact tail
pub const DEFAULT_EXACT_TRIAL_LIMIT: u64 = 1_000_000;

/// Delays (in ms) a target can buffer; connections outside are not counted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayWindow {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl DelayWindow {
    pub fn new(min_ms: f64, max_ms: f64) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Binomial upper-quantile estimator shared by all connectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundEstimator {
    failure_chance: f64,
    exact_trial_limit: u64,
}

impl Default for BoundEstimator {
    fn default() -> Self {
        Self {
            failure_chance: DEFAULT_FAILURE_CHANCE,
            exact_trial_limit: DEFAULT_EXACT_TRIAL_LIMIT,
        }
    }
}

impl BoundEstimator {
    pub fn new(failure_chance: f64, exact_trial_limit: u64) -> ConnectivityResult<Self> {
        if !(failure_chance > 0.0 && failure_chance < 1.0) {
            return Err(ConnectivityError::InvalidParameter(format!(
                "failure chance {} must lie strictly between 0 and 1",
                failure_chance
            )));
        }
        Ok(Self {
            failure_chance,
            exact_trial_limit,
        })
    }

    pub fn failure_chance(&self) -> f64 {
        self.failure_chance
    }

    pub fn exact_trial_limit(&self) -> u64 {
        self.exact_trial_limit
    }

    /// Bound on the count selected from `n_trials` draws of probability `p`
    pub fn max_connections(&self, n_trials: u64, p: f64) -> u64 {
        self.upper_quantile(n_trials, p, self.failure_chance)
    }

    /// Like [`BoundEstimator::max_connections`], with the failure chance shared
    /// out over all `n_total_trials` elements of the connector
    pub fn probable_maximum_selected(&self, n_total_trials: u64, n_trials: u64, p: f64) -> u64 {
        let chance = self.failure_chance / n_total_trials.max(1) as f64;
        self.upper_quantile(n_trials, p, chance)
    }

    /// Restrict a connection count to the delays a target can hold.
    ///
    /// Fixed delays are all-or-nothing; random delays keep the probable maximum
    /// of connections whose delay lands in the window.
    pub fn restrict_to_delay_window(
        &self,
        n_total_trials: u64,
        n_connections: u64,
        delays: &ParameterDescriptor,
        window: Option<DelayWindow>,
    ) -> u64 {
        let Some(window) = window else {
            return n_connections;
        };
        let p = delays.probability_within(window.min_ms, window.max_ms);
        if p >= 1.0 {
            n_connections
        } else {
            self.probable_maximum_selected(n_total_trials, n_connections, p)
        }
    }

    fn upper_quantile(&self, n_trials: u64, p: f64, chance: f64) -> u64 {
        if n_trials == 0 || p.is_nan() || p <= 0.0 {
            return 0;
        }
        if p >= 1.0 || chance.is_nan() || chance <= 0.0 {
            return n_trials;
        }
        if chance >= 1.0 {
            return 0;
        }
        if n_trials <= self.exact_trial_limit {
            exact_upper_quantile(n_trials, p, chance)
        } else {
            bernstein_upper_bound(n_trials, p, chance)
        }
    }
}

/// Free-function form using the default exact-trial limit
pub fn max_connections(n_trials: u64, selection_probability: f64, failure_chance: f64) -> u64 {
    let estimator = BoundEstimator {
        failure_chance,
        exact_trial_limit: DEFAULT_EXACT_TRIAL_LIMIT,
    };
    estimator.upper_quantile(n_trials, selection_probability, failure_chance)
}

fn exact_upper_quantile(n: u64, p: f64, chance: f64) -> u64 {
    let log_q = (-p).ln_1p();
    let log_odds = p.ln() - log_q;
    let mean = n as f64 * p;
    let negligible = chance.ln() - 40.0;

    // log pmf(k) for k = 0..=last, stopping once terms are negligible and
    // shrinking by at least half per step
    let mut log_pmf = Vec::new();
    let mut current = n as f64 * log_q;
    let mut k = 0u64;
    loop {
        log_pmf.push(current);
        if k == n {
            break;
        }
        let step = ((n - k) as f64).ln() - ((k + 1) as f64).ln() + log_odds;
        if (k as f64) > mean && current < negligible && step < -std::f64::consts::LN_2 {
            break;
        }
        current += step;
        k += 1;
    }

    let last = log_pmf.len() - 1;
    // Everything past `last` sums to at most pmf(last)
    let mut tail_above = if last as u64 == n {
        0.0
    } else {
        log_pmf[last].exp()
    };
    let limit = chance * (1.0 - 1e-9);
    let mut bound = last;
    while bound > 0 {
        let with_bound = tail_above + log_pmf[bound].exp();
        if with_bound > limit {
            break;
        }
        tail_above = with_bound;
        bound -= 1;
    }
    bound as u64
}

fn bernstein_upper_bound(n: u64, p: f64, chance: f64) -> u64 {
    let l = -chance.ln();
    let mean = n as f64 * p;
    // Variance np(1-p) is bounded by np to keep the bound monotonic in p
    let deviation = l / 3.0 + (l * l / 9.0 + 2.0 * l * mean).sqrt();
    let bound = (mean + deviation).ceil();
    if bound >= n as f64 {
        n
    } else {
        bound as u64
    }
}
