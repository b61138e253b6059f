pub mod error;
pub mod health;
pub mod messages;
pub mod room;

pub use error::*;
pub use health::*;
pub use messages::*;
pub use room::*;
