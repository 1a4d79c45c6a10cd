//! Pure data structures for orders, line items, the status lifecycle and the
//! events exchanged over the message bus.

mod ids;
pub mod event;
pub mod order;
pub mod status;

pub use event::*;
pub use ids::*;
pub use order::*;
pub use status::*;
