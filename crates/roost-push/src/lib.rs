//! Push notification fanout. The engine enqueues one job per message;
//! the worker here dispatches it to every recipient device token
//! through a pluggable provider, off the request path.

pub mod provider;
pub mod worker;

pub use provider::{HttpPushProvider, PushProvider, TokenOutcome};
pub use worker::spawn;
