pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scope;
pub mod select;
pub mod shader;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
