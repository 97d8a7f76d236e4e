//! Query functions over a borrowed connection. Free functions (rather
//! than `Database` methods) so engine code can compose several of them
//! inside one `with_txn` unit; a `Transaction` derefs to `Connection`.

pub mod conversations;
pub mod messages;
pub mod reactions;
pub mod relations;
pub mod users;

pub use conversations::*;
pub use messages::*;
pub use reactions::*;
pub use relations::*;
pub use users::*;
