pub mod fixtures;
pub mod predictions;
pub mod pipeline;
pub mod accuracy;
pub mod error;
pub mod keys;

pub use fixtures::*;
pub use predictions::*;
pub use pipeline::*;
pub use accuracy::*;
pub use error::*;
