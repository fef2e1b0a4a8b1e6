pub mod address;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod record;
pub mod scheduler;
pub mod store;
pub mod worker;

pub use error::{BlacklistError, Result};
