mod setup;
mod targets;

pub use setup::{SetupArgs, cmd_setup};
pub use targets::cmd_targets;
