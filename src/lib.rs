pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod http;
pub mod logging;
pub mod service;
pub mod storage;

pub use config::Config;
pub use error::{Result, TechNotesError};
pub use service::Services;
