//! QuestLab client - quest progress controller, adapters and demo runner.
//!
//! Layering follows ports-and-adapters: `ports::outbound` declares the
//! collaborator contracts, `application` holds the workflow controller and
//! its session state, `infrastructure` provides the HTTP/clock/retry
//! implementations, and `runner` wires a scripted demo pass.

pub mod application;
pub mod infrastructure;
pub mod ports;
pub mod runner;
