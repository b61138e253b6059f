pub mod health;
pub mod rooms;
pub mod ws;

pub use health::*;
pub use rooms::*;
pub use ws::*;
