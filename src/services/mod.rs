//! Service layer: business logic shared by the API server, the queue
//! worker, and the CLI.

pub mod reengage;
pub mod reply;
pub mod worker;

#[allow(unused_imports)]
pub use reengage::ReengageService;
#[allow(unused_imports)]
pub use reply::{PlanConfig, ReplyService, SmsConfig};
#[allow(unused_imports)]
pub use worker::QueueWorker;
