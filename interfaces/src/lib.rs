pub mod defs;
pub mod empty;

pub use defs::*;
pub use empty::{DiscardPublisher, NoMediaProcessor};
