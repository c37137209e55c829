mod command;
mod tick;

pub use command::{Actions, UserCommand, UserCommandBuffer};
pub use tick::FixedTimestep;
