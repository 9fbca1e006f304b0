pub mod app;
pub mod asset;
pub mod auth;
pub mod call;
pub mod callrecord;
pub mod config;
pub mod error;
pub mod handler;
pub mod storage;
pub mod telephony;
pub mod user;
pub mod utils;
pub mod version;
