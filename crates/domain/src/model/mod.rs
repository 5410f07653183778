mod brick;
mod event;
mod message;
mod plan;
mod preferences;

pub use brick::*;
pub use event::*;
pub use message::*;
pub use plan::*;
pub use preferences::*;
