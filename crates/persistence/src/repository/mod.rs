//! Repository implementations for database operations

pub mod stream;

pub use stream::*;
