//! In-memory data stores

pub mod users;

pub use users::{User, UserDirectory, UserError};
