pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod outfit;
pub mod state;
pub mod utils;

pub use config::Config;
pub use error::{Degradation, StylistError};
