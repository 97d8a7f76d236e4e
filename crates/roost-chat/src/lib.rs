pub mod error;
pub mod membership;
pub mod messages;
pub mod permissions;
pub mod publisher;
pub mod reactions;
pub mod relations;
pub mod service;
pub mod storage;

mod wire;

pub use error::{ChatError, ChatResult};
pub use service::ChatService;
