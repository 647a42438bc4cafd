//! Discrete hidden Markov models.
//!
//! This module provides parameter estimation for HMMs over a finite
//! observation alphabet:
//! - Forward pass (prefix probabilities, plain and scaled)
//! - Backward pass (suffix probabilities, plain and scaled)
//! - Baum-Welch re-estimation of the transition and emission matrices
//!
//! # Algorithms
//!
//! Baum-Welch is an Expectation-Maximization procedure. Each iteration runs
//! the forward and backward passes over a single observation sequence,
//! turns them into posterior state and state-pair probabilities, and derives
//! new row-stochastic matrices from those expected counts.
//!
//! # Examples
//!
//! ```rust
//! use discrete_hmm::hmm::{fit, BaumWelchConfig, HiddenMarkovModel};
//! use ndarray::array;
//!
//! let model = HiddenMarkovModel::new(
//!     array![[0.9, 0.1], [0.2, 0.8]],
//!     array![[0.7, 0.3], [0.1, 0.9]],
//!     array![0.5, 0.5],
//! )
//! .unwrap();
//!
//! let observations = [0, 0, 0, 1, 1, 1, 0, 0, 1, 1];
//! let config = BaumWelchConfig::new(200).with_tolerance(1e-9);
//! let report = fit(&model, &observations, &config).unwrap();
//!
//! assert!(report.log_likelihood >= report.log_likelihoods[0]);
//! ```

pub mod backward;
pub mod baum_welch;
pub mod forward;
pub mod model;


pub use backward::{backward, backward_scaled};
pub use baum_welch::{
    baum_welch, expectations, fit, reestimate, BaumWelchConfig, BaumWelchReport, Expectations,
    Reestimation, DEFAULT_ITERATIONS,
};
pub use forward::{forward, forward_scaled, ScaledForward};
pub use model::{HiddenMarkovModel, ROW_SUM_TOLERANCE};
