use approx::abs_diff_eq;
use ndarray::{Array1, Array2, ArrayView1};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{Error, Result};
use crate::hmm::forward::{forward_scaled_unchecked, forward_unchecked};

/// Tolerance used when checking that a probability vector sums to 1.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Represents a discrete Hidden Markov Model (HMM), storing:
/// - `transition[[i, j]]`: probability of moving from state i to state j
/// - `emission[[i, k]]`: probability of emitting symbol k in state i
/// - `initial[i]`: probability of starting in state i
///
/// # Constraints
/// - There is at least one state and one symbol.
/// - `transition` is `M x M`, `emission` is `M x N` and `initial` has length `M`.
/// - Every entry lies in `[0, 1]` and every row (and `initial`) sums to 1.
///
/// A value of this type always satisfies the constraints above; they are
/// checked by [`HiddenMarkovModel::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenMarkovModel {
    transition: Array2<f64>,
    emission: Array2<f64>,
    initial: Array1<f64>,
}

impl HiddenMarkovModel {
    /// Create a new `HiddenMarkovModel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if dimensions of the transition or
    /// emission matrices disagree, if `initial` does not have one entry per
    /// state, or if any row is not a probability distribution.
    ///
    /// # Example
    ///
    /// ```
    /// use discrete_hmm::HiddenMarkovModel;
    /// use ndarray::array;
    ///
    /// let hmm = HiddenMarkovModel::new(
    ///     array![[0.7, 0.3], [0.4, 0.6]],
    ///     array![[0.5, 0.4, 0.1], [0.1, 0.3, 0.6]],
    ///     array![0.6, 0.4],
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(hmm.num_states(), 2);
    /// assert_eq!(hmm.num_symbols(), 3);
    /// ```
    pub fn new(
        transition: Array2<f64>,
        emission: Array2<f64>,
        initial: Array1<f64>,
    ) -> Result<Self> {
        let (rows, cols) = transition.dim();
        if rows == 0 {
            return Err(Error::invalid_input(
                "transition must have at least one state",
            ));
        }
        if rows != cols {
            return Err(Error::invalid_input(format!(
                "transition must be square, got {rows}x{cols}"
            )));
        }

        let (emission_rows, symbols) = emission.dim();
        if emission_rows != rows {
            return Err(Error::invalid_input(format!(
                "emission must have {rows} rows to match transition, got {emission_rows}"
            )));
        }
        if symbols == 0 {
            return Err(Error::invalid_input(
                "emission must have at least one symbol column",
            ));
        }

        if initial.len() != rows {
            return Err(Error::invalid_input(format!(
                "initial must have {rows} entries, got {}",
                initial.len()
            )));
        }

        for (i, row) in transition.outer_iter().enumerate() {
            check_distribution(row, || format!("transition row {i}"))?;
        }
        for (i, row) in emission.outer_iter().enumerate() {
            check_distribution(row, || format!("emission row {i}"))?;
        }
        check_distribution(initial.view(), || "initial".to_string())?;

        Ok(Self {
            transition,
            emission,
            initial,
        })
    }

    /// Assembles a model from matrices already known to be row-stochastic.
    pub(crate) fn from_parts(
        transition: Array2<f64>,
        emission: Array2<f64>,
        initial: Array1<f64>,
    ) -> Self {
        Self {
            transition,
            emission,
            initial,
        }
    }

    /// `M`, the number of hidden states.
    pub fn num_states(&self) -> usize {
        self.transition.nrows()
    }

    /// `N`, the number of distinct observation symbols.
    pub fn num_symbols(&self) -> usize {
        self.emission.ncols()
    }

    pub fn transition(&self) -> &Array2<f64> {
        &self.transition
    }

    pub fn emission(&self) -> &Array2<f64> {
        &self.emission
    }

    pub fn initial(&self) -> &Array1<f64> {
        &self.initial
    }

    /// Consumes the model, returning `(transition, emission, initial)`.
    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>, Array1<f64>) {
        (self.transition, self.emission, self.initial)
    }

    /// Checks that `observations` is non-empty and only uses symbols this
    /// model can emit.
    pub fn validate_observations(&self, observations: &[usize]) -> Result<()> {
        if observations.is_empty() {
            return Err(Error::invalid_input(
                "observation sequence must not be empty",
            ));
        }
        let symbols = self.num_symbols();
        if let Some((t, &symbol)) = observations
            .iter()
            .enumerate()
            .find(|(_, &symbol)| symbol >= symbols)
        {
            return Err(Error::invalid_input(format!(
                "observation {symbol} at position {t} is out of range (symbols = {symbols})"
            )));
        }
        Ok(())
    }

    /// Probability of `observations` under this model, `P(O)`.
    ///
    /// Computed without scaling, so it underflows to zero on long sequences;
    /// use [`HiddenMarkovModel::log_likelihood`] there.
    pub fn likelihood(&self, observations: &[usize]) -> Result<f64> {
        self.validate_observations(observations)?;
        let alpha = forward_unchecked(self, observations);
        Ok(alpha.column(observations.len() - 1).sum())
    }

    /// Natural log of `P(O)`, computed from the scaled forward pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NumericDegeneracy`] if the sequence has probability
    /// zero under this model.
    pub fn log_likelihood(&self, observations: &[usize]) -> Result<f64> {
        self.validate_observations(observations)?;
        Ok(forward_scaled_unchecked(self, observations)?.log_likelihood())
    }

    /// Draws a hidden state path and the observations it emits.
    ///
    /// Returns `(states, observations)`, both of length `len`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        len: usize,
        rng: &mut R,
    ) -> Result<(Vec<usize>, Vec<usize>)> {
        let start = weighted(self.initial.view())?;
        let moves = self
            .transition
            .outer_iter()
            .map(weighted)
            .collect::<Result<Vec<_>>>()?;
        let emits = self
            .emission
            .outer_iter()
            .map(weighted)
            .collect::<Result<Vec<_>>>()?;

        let mut states = Vec::with_capacity(len);
        let mut observations = Vec::with_capacity(len);
        let mut state = start.sample(rng);
        for t in 0..len {
            if t > 0 {
                state = moves[state].sample(rng);
            }
            states.push(state);
            observations.push(emits[state].sample(rng));
        }
        Ok((states, observations))
    }
}

fn check_distribution<F>(values: ArrayView1<f64>, name: F) -> Result<()>
where
    F: Fn() -> String,
{
    if let Some(bad) = values
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(Error::invalid_input(format!(
            "{} contains {bad}, expected probabilities in [0, 1]",
            name()
        )));
    }
    let sum = values.sum();
    if !abs_diff_eq!(sum, 1.0, epsilon = ROW_SUM_TOLERANCE) {
        return Err(Error::invalid_input(format!(
            "{} sums to {sum}, expected 1",
            name()
        )));
    }
    Ok(())
}

fn weighted(row: ArrayView1<f64>) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(row.iter())
        .map_err(|e| Error::invalid_input(format!("cannot sample from {row}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn weather() -> HiddenMarkovModel {
        HiddenMarkovModel::new(
            array![[0.7, 0.3], [0.4, 0.6]],
            array![[0.5, 0.4, 0.1], [0.1, 0.3, 0.6]],
            array![0.6, 0.4],
        )
        .unwrap()
    }

    #[test]
    fn test_new_accepts_valid_model() {
        let hmm = weather();
        assert_eq!(hmm.num_states(), 2);
        assert_eq!(hmm.num_symbols(), 3);
        assert_eq!(hmm.initial(), &array![0.6, 0.4]);
    }

    #[test]
    fn test_non_square_transition_rejected() {
        let result = HiddenMarkovModel::new(
            Array2::from_elem((3, 4), 0.25),
            Array2::from_elem((3, 2), 0.5),
            Array1::from_elem(3, 1.0 / 3.0),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_emission_row_count_mismatch_rejected() {
        let result = HiddenMarkovModel::new(
            array![[0.5, 0.5], [0.5, 0.5]],
            array![[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]],
            array![0.5, 0.5],
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_initial_length_mismatch_rejected() {
        let result = HiddenMarkovModel::new(
            array![[0.5, 0.5], [0.5, 0.5]],
            array![[1.0], [1.0]],
            array![1.0],
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_model_rejected() {
        let result = HiddenMarkovModel::new(
            Array2::zeros((0, 0)),
            Array2::zeros((0, 3)),
            Array1::zeros(0),
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let result = HiddenMarkovModel::new(array![[1.0]], Array2::zeros((1, 0)), array![1.0]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_rows_must_be_distributions() {
        let unnormalized = HiddenMarkovModel::new(
            array![[0.5, 0.6], [0.5, 0.5]],
            array![[1.0], [1.0]],
            array![0.5, 0.5],
        );
        assert!(matches!(unnormalized, Err(Error::InvalidInput(_))));

        let negative = HiddenMarkovModel::new(
            array![[1.2, -0.2], [0.5, 0.5]],
            array![[1.0], [1.0]],
            array![0.5, 0.5],
        );
        assert!(matches!(negative, Err(Error::InvalidInput(_))));

        let not_finite = HiddenMarkovModel::new(
            array![[1.0]],
            array![[f64::NAN, 1.0]],
            array![1.0],
        );
        assert!(matches!(not_finite, Err(Error::InvalidInput(_))));

        let bad_initial = HiddenMarkovModel::new(
            array![[0.5, 0.5], [0.5, 0.5]],
            array![[1.0], [1.0]],
            array![0.5, 0.4],
        );
        assert!(matches!(bad_initial, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_observations() {
        let hmm = weather();
        assert!(hmm.validate_observations(&[0, 1, 2]).is_ok());
        assert!(matches!(
            hmm.validate_observations(&[]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            hmm.validate_observations(&[0, 3]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_likelihood_matches_hand_computation() {
        // alpha(T-1) = [0.007696, 0.028584]
        let hmm = weather();
        let p = hmm.likelihood(&[0, 1, 2]).unwrap();
        approx::assert_abs_diff_eq!(p, 0.03628, epsilon = 1e-12);

        let ll = hmm.log_likelihood(&[0, 1, 2]).unwrap();
        approx::assert_abs_diff_eq!(ll, 0.03628_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_log_likelihood_of_impossible_sequence() {
        let hmm = HiddenMarkovModel::new(
            array![[1.0]],
            array![[1.0, 0.0]],
            array![1.0],
        )
        .unwrap();
        assert_eq!(hmm.likelihood(&[0, 1]).unwrap(), 0.0);
        assert!(matches!(
            hmm.log_likelihood(&[0, 1]),
            Err(Error::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn test_sample_follows_deterministic_model() {
        let hmm = HiddenMarkovModel::new(
            array![[1.0, 0.0], [0.0, 1.0]],
            array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            array![0.0, 1.0],
        )
        .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (states, observations) = hmm.sample(50, &mut rng).unwrap();
        assert_eq!(states, vec![1; 50]);
        assert_eq!(observations, vec![2; 50]);
    }

    #[test]
    fn test_sample_is_reproducible() {
        let hmm = weather();
        let (s1, o1) = hmm
            .sample(100, &mut ChaCha8Rng::seed_from_u64(42))
            .unwrap();
        let (s2, o2) = hmm
            .sample(100, &mut ChaCha8Rng::seed_from_u64(42))
            .unwrap();
        assert_eq!(s1, s2);
        assert_eq!(o1, o2);
        assert!(o1.iter().all(|&o| o < hmm.num_symbols()));
        assert!(s1.iter().all(|&s| s < hmm.num_states()));
    }
}
