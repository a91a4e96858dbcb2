pub(crate) mod command;
pub(crate) mod logview;
pub(crate) mod render;
pub(crate) mod run;

pub use self::command::{
    Args, Command, LogCommand, LogExportArgs, LogStatsArgs, PairingArgs, RunArgs,
};
