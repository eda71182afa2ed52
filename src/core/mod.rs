pub mod config;
pub mod error;
pub mod types;

pub use config::{Pacing, RunConfig};
pub use error::{SweepError, SweepResult};
