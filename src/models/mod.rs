pub mod irrigation_log;
pub mod message;
pub mod recommendation;
pub mod weather;

pub use irrigation_log::*;
pub use message::*;
pub use recommendation::*;
pub use weather::*;
