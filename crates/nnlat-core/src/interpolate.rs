//! Interpolation of neural network and lattice LM log-probabilities.

/// How the network and lattice LM scores are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// `w * nn + (1 - w) * lat` in log space (pseudo log-linear, not normalized).
    #[default]
    LogLinear,
    /// `log(w * exp(nn) + (1 - w) * exp(lat))`.
    Linear,
}

impl Interpolation {
    pub fn from_linear_flag(linear: bool) -> Self {
        if linear {
            Self::Linear
        } else {
            Self::LogLinear
        }
    }

    /// Interpolate `nn_logprob` and `lattice_logprob` with weight `nn_weight`
    /// on the network component.
    pub fn apply(self, nn_logprob: f64, lattice_logprob: f64, nn_weight: f64) -> f64 {
        match self {
            Self::LogLinear => {
                interpolate_loglinear(nn_logprob, lattice_logprob, nn_weight, 1.0 - nn_weight)
            }
            Self::Linear => interpolate_linear(nn_logprob, lattice_logprob, nn_weight),
        }
    }
}

/// Weighted sum of two log-probabilities.
///
/// A zero weight drops its component entirely, so `0 * -inf` never turns
/// into NaN.
pub fn interpolate_loglinear(logprob1: f64, logprob2: f64, weight1: f64, weight2: f64) -> f64 {
    let term = |weight: f64, logprob: f64| if weight == 0.0 { 0.0 } else { weight * logprob };
    term(weight1, logprob1) + term(weight2, logprob2)
}

/// Log of the weighted mixture `weight1 * p1 + (1 - weight1) * p2`, computed
/// with log-sum-exp.
pub fn interpolate_linear(logprob1: f64, logprob2: f64, weight1: f64) -> f64 {
    let weight2 = 1.0 - weight1;
    let a = if weight1 > 0.0 {
        weight1.ln() + logprob1
    } else {
        f64::NEG_INFINITY
    };
    let b = if weight2 > 0.0 {
        weight2.ln() + logprob2
    } else {
        f64::NEG_INFINITY
    };
    log_add(a, b)
}

/// `log(exp(a) + exp(b))` without overflow or underflow.
pub fn log_add(a: f64, b: f64) -> f64 {
    // Both -inf would give NaN from the subtraction below.
    if a == f64::NEG_INFINITY && b == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}
