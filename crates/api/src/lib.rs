pub mod routes;
pub mod error;
pub mod middleware;

pub use routes::*;
pub use error::*;
