//! Core data types for the price-alert bot.

pub mod asset;
pub mod event;
pub mod format;
pub mod quote;
pub mod subscription;

pub use asset::*;
pub use event::*;
pub use format::*;
pub use quote::*;
pub use subscription::*;
