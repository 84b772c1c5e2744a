pub mod fixtures;
pub mod provider;
pub mod chain;
pub mod controller;
pub mod orchestrator;
pub mod scoring;
pub mod accuracy;
pub mod health;
pub mod maintenance;
pub mod metrics;
pub mod scheduler;

pub use fixtures::*;
pub use provider::*;
pub use chain::*;
pub use controller::*;
pub use orchestrator::*;
pub use accuracy::*;
pub use health::*;
pub use maintenance::*;
pub use metrics::*;
pub use scheduler::*;
