pub mod adapter;
pub mod bot;
pub mod config;
pub mod http;
