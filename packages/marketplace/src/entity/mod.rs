pub mod plugin;
pub mod plugin_installation;
pub mod plugin_log;
pub mod plugin_setting;
pub mod plugin_storage;
