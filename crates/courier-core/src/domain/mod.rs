//! Domain model (IDs, jobs, outcomes, feedback, decisions, errors).

pub mod decision;
pub mod errors;
pub mod feedback;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod state;

pub use decision::{Decision, DeliveryDecider};
pub use errors::{QueueError, RelayError};
pub use feedback::{FeedbackReason, TokenFeedback};
pub use ids::{JobId, ServiceId};
pub use job::PushJob;
pub use outcome::DeliveryOutcome;
pub use state::WorkerState;
