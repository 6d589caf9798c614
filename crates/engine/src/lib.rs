//! Drip campaign execution engine — per-recipient state-machine progression,
//! exactly-once-per-step delivery under at-least-once invocation, and
//! tenant-isolated eligibility selection.

pub mod demo;
pub mod evaluator;
pub mod log;
pub mod runner;
pub mod selector;
pub mod store;
pub mod trigger;

pub use log::ExecutionLog;
pub use runner::{CampaignRunner, RunOptions};
pub use selector::EligibilitySelector;
pub use store::{CampaignStore, MembershipStore, StepStore};
pub use trigger::TriggerDispatcher;
