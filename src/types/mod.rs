pub mod contact;
pub mod events;
pub mod friendship;
pub mod message;
pub mod room;

pub use contact::*;
pub use friendship::*;
pub use message::*;
pub use room::*;
