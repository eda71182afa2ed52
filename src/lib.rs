pub mod core;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::{Pacing, RunConfig, SweepError, SweepResult};

// --- Short module paths ---
pub use features::{antibot, sink};
pub use scraping::driver;
pub use tools::{dispatch, executor, extract, load_more, partition};
