// ABOUTME: PostgreSQL access for the account database
// ABOUTME: Exports connection management and the live SchemaSource

pub mod connection;
pub mod source;

pub use connection::{connect, connect_with_retry};
pub use source::PgSource;
