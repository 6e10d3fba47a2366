pub mod constants;
pub mod error;
pub mod logger;

pub use error::{ReactorError, Result};
