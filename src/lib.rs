pub mod commands;
pub mod config;
pub mod download;
pub mod http;
pub mod i18n;
pub mod notify;
pub mod runtime;
pub mod session;
pub mod upload;
