pub mod batch;
pub mod connection;
pub mod migrations;
pub mod queries;

pub use batch::{BatchWriter, WriteOp};
pub use connection::Database;
