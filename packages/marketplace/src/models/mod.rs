pub mod installation;
pub mod plugin;
