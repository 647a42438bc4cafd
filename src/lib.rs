pub mod error;
pub mod hmm;

pub use error::{Error, Result};
pub use hmm::{baum_welch, BaumWelchConfig, BaumWelchReport, HiddenMarkovModel};
