pub mod activity;
pub mod api;
pub mod catalog;
pub mod host;
pub mod installation;
pub mod settings;
