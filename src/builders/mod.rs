mod command;
mod parameter;

pub use command::{Command, CommandBuilder, CommandKind, CommandSpec};
pub use parameter::{Parameter, ParameterDirection};
