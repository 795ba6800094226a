//! CLI command handling module
//!
//! Handles all CLI subcommands and argument parsing.

mod commands;
mod logging;
mod version;

pub use commands::{
    ConfigSubcommand, Settings, StdoutStateSender, handle_config_command, handle_contexts_command,
    handle_permissions_command, handle_watch_command,
};
pub use logging::init_logging;
pub use version::display_version;
