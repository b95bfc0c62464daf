pub mod pipeline;
pub mod water_balance;

pub use pipeline::{CycleOutcome, FetchMode, WaterCycleService};
