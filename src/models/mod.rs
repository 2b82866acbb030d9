//! Data models for Bestie.

mod conversation;
mod error_entry;
mod link;
mod message;
mod profile;
mod user;

pub use conversation::Conversation;
pub use error_entry::ErrorEntry;
pub use link::{Click, Link, Purchase};
pub use message::{Direction, Message};
pub use profile::{PlanStatus, UserProfile};
pub use user::User;
