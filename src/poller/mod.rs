//! Face-swap job lifecycle: detection, submission and status polling.

mod job_poller;
mod outcome;
mod policy;
mod request;

pub use job_poller::JobPoller;
pub use outcome::{ImageSide, PollResult, SwapError, SwapSuccess};
pub use policy::PollPolicy;
pub use request::{RequestMetadata, SwapRequest};
