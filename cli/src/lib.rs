mod config_file;
mod monitor_cmd;
mod script;

pub use config_file::DeskConfig;
pub use config_file::UserSection;
pub use monitor_cmd::CompileArgs;
pub use monitor_cmd::GroupsArgs;
pub use monitor_cmd::MonitorCli;
pub use monitor_cmd::MonitorCommand;
pub use monitor_cmd::ReplayArgs;
pub use script::Step;
pub use script::StoredItem;
