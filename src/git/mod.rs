mod runner;

pub use runner::{GitRunner, MergeOutcome};
