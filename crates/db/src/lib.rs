pub mod store;
pub mod memory;
pub mod postgres;
pub mod migrations;
pub mod connection;

pub use store::*;
pub use memory::*;
pub use postgres::*;
pub use connection::*;
