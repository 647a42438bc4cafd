use approx::abs_diff_eq;
use log::{debug, trace, warn};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, Axis};

use crate::error::{Error, Result};
use crate::hmm::backward::backward_unchecked;
use crate::hmm::forward::{forward_scaled_unchecked, forward_unchecked};
use crate::hmm::model::ROW_SUM_TOLERANCE;
use crate::hmm::HiddenMarkovModel;

/// Number of EM updates applied when the caller does not choose one.
pub const DEFAULT_ITERATIONS: usize = 1000;

/// Configuration options for Baum-Welch estimation.
///
/// The defaults reproduce the plain algorithm: exactly `iterations` updates,
/// no smoothing, a fixed initial distribution and unscaled passes.
#[derive(Debug, Clone, PartialEq)]
pub struct BaumWelchConfig {
    /// Maximum number of EM updates.
    pub iterations: usize,
    /// Stop early once the log-likelihood changes by less than this between
    /// consecutive iterations. `None` always runs `iterations` updates.
    pub tolerance: Option<f64>,
    /// Pseudocount added to every expected count in the M-step.
    pub pseudocount: f64,
    /// Re-estimate the initial distribution from the first posterior column.
    pub reestimate_initial: bool,
    /// Run the E-step on scaled forward/backward tables.
    pub scaling: bool,
}

impl Default for BaumWelchConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl BaumWelchConfig {
    /// Create a new config running exactly `iterations` updates.
    pub fn new(iterations: usize) -> Self {
        Self {
            iterations,
            tolerance: None,
            pseudocount: 0.0,
            reestimate_initial: false,
            scaling: false,
        }
    }

    /// Stop once the log-likelihood improvement falls below `tolerance`.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Add `pseudocount` to every expected transition and emission count.
    pub fn with_pseudocount(mut self, pseudocount: f64) -> Self {
        self.pseudocount = pseudocount;
        self
    }

    pub fn with_initial_reestimation(mut self, reestimate_initial: bool) -> Self {
        self.reestimate_initial = reestimate_initial;
        self
    }

    pub fn with_scaling(mut self, scaling: bool) -> Self {
        self.scaling = scaling;
        self
    }

    /// Checks the configuration before any computation runs.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::invalid_input("iterations must be positive"));
        }
        if let Some(tolerance) = self.tolerance {
            if !(tolerance.is_finite() && tolerance >= 0.0) {
                return Err(Error::invalid_input(format!(
                    "tolerance must be a non-negative finite number, got {tolerance}"
                )));
            }
        }
        if !(self.pseudocount.is_finite() && self.pseudocount >= 0.0) {
            return Err(Error::invalid_input(format!(
                "pseudocount must be a non-negative finite number, got {}",
                self.pseudocount
            )));
        }
        Ok(())
    }
}

/// Posterior quantities computed by the E-step.
#[derive(Debug, Clone)]
pub struct Expectations {
    /// `M x M x (T - 1)`; `xi[[i, j, t]]` is the probability of state `i` at
    /// `t` and state `j` at `t + 1` given the whole sequence.
    pub xi: Array3<f64>,
    /// `M x T`; `gamma[[i, t]]` is the probability of state `i` at `t` given
    /// the whole sequence.
    pub gamma: Array2<f64>,
    /// `ln P(O)` under the parameters the expectations were computed from.
    pub log_likelihood: f64,
}

/// One EM update: the new parameters and the log-likelihood of the old ones.
#[derive(Debug, Clone)]
pub struct Reestimation {
    pub model: HiddenMarkovModel,
    pub log_likelihood: f64,
}

/// Result of a full Baum-Welch run.
#[derive(Debug, Clone)]
pub struct BaumWelchReport {
    /// The re-estimated model.
    pub model: HiddenMarkovModel,
    /// Number of EM updates applied.
    pub iterations: usize,
    /// Whether the tolerance stopped the run before the iteration budget.
    pub converged: bool,
    /// `ln P(O)` of the parameters seen at each E-step, in order.
    pub log_likelihoods: Vec<f64>,
    /// `ln P(O)` under the returned model, `-inf` if the sequence became
    /// impossible.
    pub log_likelihood: f64,
}

/// Estimates the transition and emission matrices of a discrete HMM from a
/// single observation sequence.
///
/// Runs exactly `iterations` EM updates starting from the given parameters.
/// The initial distribution is held fixed. The caller's matrices are not
/// modified.
///
/// # Arguments
///
/// - `observations`: symbol indices, each `< emission.ncols()`
/// - `transition`: `M x M` row-stochastic initial guess
/// - `emission`: `M x N` row-stochastic initial guess
/// - `initial`: starting distribution over the `M` states
/// - `iterations`: number of updates, must be positive
///
/// # Errors
///
/// - [`Error::InvalidInput`] for shape or value problems in any argument.
/// - [`Error::NumericDegeneracy`] when the sequence has probability zero
///   under the current parameters or a state is never occupied.
///
/// # Example
///
/// ```
/// use discrete_hmm::baum_welch;
/// use ndarray::array;
///
/// let observations = [0, 0, 1, 1, 0, 1, 0, 0];
/// let (transition, emission) = baum_welch(
///     &observations,
///     &array![[0.8, 0.2], [0.3, 0.7]],
///     &array![[0.6, 0.4], [0.2, 0.8]],
///     &array![0.5, 0.5],
///     20,
/// )
/// .unwrap();
///
/// for row in transition.rows() {
///     assert!((row.sum() - 1.0).abs() < 1e-6);
/// }
/// for row in emission.rows() {
///     assert!((row.sum() - 1.0).abs() < 1e-6);
/// }
/// ```
pub fn baum_welch(
    observations: &[usize],
    transition: &Array2<f64>,
    emission: &Array2<f64>,
    initial: &Array1<f64>,
    iterations: usize,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let config = BaumWelchConfig::new(iterations);
    config.validate()?;
    let model = HiddenMarkovModel::new(transition.clone(), emission.clone(), initial.clone())?;

    let report = fit(&model, observations, &config)?;
    let (transition, emission, _) = report.model.into_parts();
    Ok((transition, emission))
}

/// Runs Baum-Welch with the given configuration.
///
/// Each iteration is a pure step from one parameter set to the next; the
/// loop only keeps the current model.
pub fn fit(
    model: &HiddenMarkovModel,
    observations: &[usize],
    config: &BaumWelchConfig,
) -> Result<BaumWelchReport> {
    config.validate()?;
    model.validate_observations(observations)?;

    debug!(
        "baum-welch: {} states, {} symbols, {} observations, up to {} iterations",
        model.num_states(),
        model.num_symbols(),
        observations.len(),
        config.iterations
    );

    let mut current = model.clone();
    let mut applied = 0;
    let mut converged = false;
    let mut log_likelihoods = Vec::new();

    for iteration in 0..config.iterations {
        let Reestimation {
            model: next,
            log_likelihood,
        } = step(&current, observations, config).map_err(|err| match err {
            Error::NumericDegeneracy(msg) => {
                warn!("baum-welch: iteration {iteration} is degenerate: {msg}");
                Error::numeric_degeneracy(format!("iteration {iteration}: {msg}"))
            }
            other => other,
        })?;
        trace!("baum-welch: iteration {iteration}, log-likelihood {log_likelihood}");

        let change = log_likelihoods
            .last()
            .map(|previous: &f64| log_likelihood - previous);
        log_likelihoods.push(log_likelihood);

        if let (Some(tolerance), Some(change)) = (config.tolerance, change) {
            if change.abs() < tolerance {
                debug!("baum-welch: converged after {applied} iterations (change {change})");
                converged = true;
                break;
            }
        }

        current = next;
        applied += 1;
    }

    let log_likelihood = forward_scaled_unchecked(&current, observations)
        .map(|scaled| scaled.log_likelihood())
        .unwrap_or(f64::NEG_INFINITY);
    debug!("baum-welch: finished {applied} iterations, log-likelihood {log_likelihood}");

    Ok(BaumWelchReport {
        model: current,
        iterations: applied,
        converged,
        log_likelihoods,
        log_likelihood,
    })
}

/// Applies a single EM update to `model`.
///
/// # Errors
///
/// Same as [`baum_welch`]; the iteration budget in `config` is ignored.
pub fn reestimate(
    model: &HiddenMarkovModel,
    observations: &[usize],
    config: &BaumWelchConfig,
) -> Result<Reestimation> {
    config.validate()?;
    model.validate_observations(observations)?;
    step(model, observations, config)
}

/// Computes the E-step quantities `xi` and `gamma` for `model`.
///
/// With `scaling` the passes are normalized per time step; the results match
/// the unscaled computation up to rounding.
pub fn expectations(
    model: &HiddenMarkovModel,
    observations: &[usize],
    scaling: bool,
) -> Result<Expectations> {
    model.validate_observations(observations)?;
    expectations_unchecked(model, observations, scaling)
}

fn step(
    model: &HiddenMarkovModel,
    observations: &[usize],
    config: &BaumWelchConfig,
) -> Result<Reestimation> {
    let expected = expectations_unchecked(model, observations, config.scaling)?;
    let next = maximize(model, observations, &expected, config)?;
    Ok(Reestimation {
        model: next,
        log_likelihood: expected.log_likelihood,
    })
}

fn expectations_unchecked(
    model: &HiddenMarkovModel,
    observations: &[usize],
    scaling: bool,
) -> Result<Expectations> {
    let m = model.num_states();
    let t_len = observations.len();
    let transition = model.transition();
    let emission = model.emission();

    // xi slice t is divided by pair_norm[t], the last gamma column by last_norm.
    let (alpha, beta, pair_norm, last_norm, log_likelihood) = if scaling {
        let scaled = forward_scaled_unchecked(model, observations)?;
        let beta = backward_unchecked(model, observations, Some(&scaled.scale));
        let log_likelihood = scaled.log_likelihood();
        let pair_norm = scaled.scale.slice(s![1..]).to_owned();
        (scaled.alpha, beta, pair_norm, 1.0, log_likelihood)
    } else {
        let alpha = forward_unchecked(model, observations);
        let beta = backward_unchecked(model, observations, None);
        let likelihood = alpha.column(t_len - 1).sum();
        if !(likelihood > 0.0 && likelihood.is_finite()) {
            return Err(Error::numeric_degeneracy(format!(
                "sequence likelihood is {likelihood}"
            )));
        }
        let pair_norm = Array1::from_elem(t_len - 1, likelihood);
        (alpha, beta, pair_norm, likelihood, likelihood.ln())
    };

    let mut xi = Array3::zeros((m, m, t_len - 1));
    for t in 0..t_len - 1 {
        let ahead = &emission.column(observations[t + 1]) * &beta.column(t + 1);
        for i in 0..m {
            for j in 0..m {
                xi[[i, j, t]] = alpha[[i, t]] * transition[[i, j]] * ahead[j] / pair_norm[t];
            }
        }
    }

    let mut gamma = Array2::zeros((m, t_len));
    gamma
        .slice_mut(s![.., ..t_len - 1])
        .assign(&xi.sum_axis(Axis(1)));
    gamma
        .column_mut(t_len - 1)
        .assign(&(&alpha.column(t_len - 1) / last_norm));

    Ok(Expectations {
        xi,
        gamma,
        log_likelihood,
    })
}

fn maximize(
    model: &HiddenMarkovModel,
    observations: &[usize],
    expected: &Expectations,
    config: &BaumWelchConfig,
) -> Result<HiddenMarkovModel> {
    let m = model.num_states();
    let n = model.num_symbols();

    let rows = map_states(m, |i| reestimate_rows(i, n, observations, expected, config))?;

    let mut transition = Array2::zeros((m, m));
    let mut emission = Array2::zeros((m, n));
    for (i, (transition_row, emission_row)) in rows.into_iter().enumerate() {
        transition.row_mut(i).assign(&transition_row);
        emission.row_mut(i).assign(&emission_row);
    }

    let initial = if config.reestimate_initial {
        let first = expected.gamma.column(0);
        let denominator = first.sum() + m as f64 * config.pseudocount;
        let initial = first.mapv(|g| (g + config.pseudocount) / denominator);
        check_row(initial.view(), || "initial distribution".to_string())?;
        initial
    } else {
        model.initial().clone()
    };

    Ok(HiddenMarkovModel::from_parts(transition, emission, initial))
}

/// Re-estimates the transition and emission rows of `state`.
fn reestimate_rows(
    state: usize,
    symbols: usize,
    observations: &[usize],
    expected: &Expectations,
    config: &BaumWelchConfig,
) -> Result<(Array1<f64>, Array1<f64>)> {
    let pseudocount = config.pseudocount;
    let t_len = observations.len();
    let occupancy = expected.gamma.row(state);
    let m = expected.xi.len_of(Axis(0));

    let pairs = expected.xi.index_axis(Axis(0), state).sum_axis(Axis(1));
    let leaving = occupancy.slice(s![..t_len - 1]).sum() + m as f64 * pseudocount;
    if !(leaving > 0.0 && leaving.is_finite()) {
        return Err(Error::numeric_degeneracy(format!(
            "state {state} has expected occupancy {leaving} before the last step"
        )));
    }
    let transition_row = pairs.mapv(|x| (x + pseudocount) / leaving);

    let mut emitted = Array1::<f64>::zeros(symbols);
    for (&symbol, &g) in observations.iter().zip(occupancy.iter()) {
        emitted[symbol] += g;
    }
    let total = occupancy.sum() + symbols as f64 * pseudocount;
    if !(total > 0.0 && total.is_finite()) {
        return Err(Error::numeric_degeneracy(format!(
            "state {state} has expected occupancy {total}"
        )));
    }
    let emission_row = emitted.mapv(|x| (x + pseudocount) / total);

    check_row(transition_row.view(), || format!("transition row {state}"))?;
    check_row(emission_row.view(), || format!("emission row {state}"))?;

    Ok((transition_row, emission_row))
}

fn check_row<F>(row: ArrayView1<f64>, name: F) -> Result<()>
where
    F: Fn() -> String,
{
    let sum = row.sum();
    if !abs_diff_eq!(sum, 1.0, epsilon = ROW_SUM_TOLERANCE) {
        return Err(Error::numeric_degeneracy(format!(
            "re-estimated {} sums to {sum}",
            name()
        )));
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn map_states<T, F>(m: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync + Send,
{
    use rayon::prelude::*;
    (0..m).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "parallel"))]
fn map_states<T, F>(m: usize, f: F) -> Result<Vec<T>>
where
    F: Fn(usize) -> Result<T>,
{
    (0..m).map(f).collect()
}
