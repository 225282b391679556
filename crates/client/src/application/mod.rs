//! Application layer - the quest workflow controller and its state.

pub mod activity_log;
pub mod error;
pub mod services;
pub mod simulation_gate;

pub use activity_log::{ActivityLog, LogEntry, LogLevel};
pub use error::{QuestFlowError, ServiceError};
pub use simulation_gate::{RunState, SimulationGate};
