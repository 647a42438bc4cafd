use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::hmm::HiddenMarkovModel;

/// Runs the backward pass for a sequence of observations.
///
/// Returns the `M x T` table `beta`, where `beta[[i, t]]` is the probability
/// of the observations after time `t` given state `i` at time `t`. The last
/// column is all ones. The initial distribution is not used.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `observations` is empty or uses a
/// symbol the model cannot emit.
pub fn backward(model: &HiddenMarkovModel, observations: &[usize]) -> Result<Array2<f64>> {
    model.validate_observations(observations)?;
    Ok(backward_unchecked(model, observations, None))
}

/// Runs the backward pass using the scaling coefficients of
/// [`forward_scaled`](crate::hmm::forward_scaled).
///
/// Column `t` is divided by `scale[t + 1]`, so that
/// `alpha_hat[[i, t]] * beta_hat[[i, t]]` is the posterior probability of
/// state `i` at time `t`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for invalid observations, when `scale`
/// does not have one entry per observation, or when a coefficient is not
/// positive and finite.
pub fn backward_scaled(
    model: &HiddenMarkovModel,
    observations: &[usize],
    scale: &Array1<f64>,
) -> Result<Array2<f64>> {
    model.validate_observations(observations)?;
    if scale.len() != observations.len() {
        return Err(Error::invalid_input(format!(
            "scale must have {} entries, got {}",
            observations.len(),
            scale.len()
        )));
    }
    if let Some((t, c)) = scale
        .iter()
        .enumerate()
        .find(|(_, c)| !(c.is_finite() && **c > 0.0))
    {
        return Err(Error::invalid_input(format!(
            "scale[{t}] is {c}, expected a positive finite coefficient"
        )));
    }
    Ok(backward_unchecked(model, observations, Some(scale)))
}

pub(crate) fn backward_unchecked(
    model: &HiddenMarkovModel,
    observations: &[usize],
    scale: Option<&Array1<f64>>,
) -> Array2<f64> {
    let transition = model.transition();
    let emission = model.emission();
    let t_len = observations.len();
    let mut beta = Array2::zeros((model.num_states(), t_len));
    beta.column_mut(t_len - 1).fill(1.0);

    for t in (0..t_len - 1).rev() {
        let ahead = &emission.column(observations[t + 1]) * &beta.column(t + 1);
        let mut column = transition.dot(&ahead);
        if let Some(scale) = scale {
            column /= scale[t + 1];
        }
        beta.column_mut(t).assign(&column);
    }

    beta
}
