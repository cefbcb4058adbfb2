// src/lib.rs

pub mod auth;
pub mod config;
pub mod eventbus;
pub mod http;
pub mod platforms;
pub mod repositories;
pub mod session;
pub mod tasks;

pub use miraibot_common::error::Error;
pub use config::BotConfig;
pub use crate::http::{DefaultHttpClient, HttpClient, HttpResponse};
pub use session::{RunOutcome, SessionRuntime};
