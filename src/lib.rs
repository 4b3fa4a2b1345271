pub mod cli;
pub mod commands;
pub mod engine;
pub mod error;
pub mod image_engine;
pub mod layout;
pub mod models;
pub mod page_ranges;
pub mod pdf_engine;
pub mod selection;
pub mod session;
pub mod storage;

pub use error::{Error, Result};
