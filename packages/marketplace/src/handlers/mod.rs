pub mod admin;
pub mod hook;
pub mod installation;
pub mod plugin;
