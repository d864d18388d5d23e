//! IO module - YAML run descriptions for Ewald calculations.

mod config;

pub use config::{read_run_config, IonSpec, RandomConfigs, RunConfig};
