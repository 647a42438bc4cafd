use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::hmm::HiddenMarkovModel;

/// Runs the forward pass for a sequence of observations.
///
/// Returns the `M x T` table `alpha`, where `alpha[[i, t]]` is the joint
/// probability of the first `t + 1` observations and being in state `i` at
/// time `t`. No normalization is applied, so entries underflow to zero on
/// long sequences; see [`forward_scaled`] for the scaled variant.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `observations` is empty or uses a
/// symbol the model cannot emit.
pub fn forward(model: &HiddenMarkovModel, observations: &[usize]) -> Result<Array2<f64>> {
    model.validate_observations(observations)?;
    Ok(forward_unchecked(model, observations))
}

pub(crate) fn forward_unchecked(model: &HiddenMarkovModel, observations: &[usize]) -> Array2<f64> {
    let transition = model.transition();
    let emission = model.emission();
    let mut alpha = Array2::zeros((model.num_states(), observations.len()));

    let first = model.initial() * &emission.column(observations[0]);
    alpha.column_mut(0).assign(&first);

    for (t, &symbol) in observations.iter().enumerate().skip(1) {
        // sum_j alpha[j][t-1] * transition[j][i], for every i
        let incoming = alpha.column(t - 1).dot(transition);
        alpha
            .column_mut(t)
            .assign(&(incoming * &emission.column(symbol)));
    }

    alpha
}

/// Output of [`forward_scaled`].
#[derive(Debug, Clone)]
pub struct ScaledForward {
    /// `M x T` forward table with every column normalized to sum to 1.
    pub alpha: Array2<f64>,
    /// `scale[t]` is the column sum at time `t` before normalization.
    pub scale: Array1<f64>,
}

impl ScaledForward {
    /// `ln P(O)`, the sum of the log scaling coefficients.
    pub fn log_likelihood(&self) -> f64 {
        self.scale.iter().map(|c| c.ln()).sum()
    }
}

/// Runs the forward pass, normalizing each time step to avoid underflow.
///
/// The product of all scaling coefficients equals `P(O)`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for invalid observations and
/// [`Error::NumericDegeneracy`] when a time step has probability zero.
pub fn forward_scaled(model: &HiddenMarkovModel, observations: &[usize]) -> Result<ScaledForward> {
    model.validate_observations(observations)?;
    forward_scaled_unchecked(model, observations)
}

pub(crate) fn forward_scaled_unchecked(
    model: &HiddenMarkovModel,
    observations: &[usize],
) -> Result<ScaledForward> {
    let transition = model.transition();
    let emission = model.emission();
    let t_len = observations.len();
    let mut alpha = Array2::zeros((model.num_states(), t_len));
    let mut scale = Array1::zeros(t_len);

    for (t, &symbol) in observations.iter().enumerate() {
        let column = if t == 0 {
            model.initial() * &emission.column(symbol)
        } else {
            alpha.column(t - 1).dot(transition) * &emission.column(symbol)
        };

        let c = column.sum();
        if !(c > 0.0 && c.is_finite()) {
            return Err(Error::numeric_degeneracy(format!(
                "forward scaling coefficient at t={t} is {c}"
            )));
        }
        alpha.column_mut(t).assign(&(column / c));
        scale[t] = c;
    }

    Ok(ScaledForward { alpha, scale })
}
