pub mod auth;
pub mod error;
pub mod scheduling;

pub use scheduling::*;
