pub mod animation;
pub mod config;
pub mod error;
pub mod motion;
pub mod osc;
pub mod reference;
pub mod scorer;
pub mod skeleton;

pub use error::{Result, SyncError};
