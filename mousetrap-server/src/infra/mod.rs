pub mod app_state;
pub mod factory;
pub mod runtime;
pub mod startup;
pub mod telemetry;
