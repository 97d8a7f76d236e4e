//! Real-time event dispatch: fans engine events out to connected
//! clients over a broadcast channel, with per-user targeted channels
//! for events only one user may see.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, Envelope};
