pub mod routes;
pub mod error;

pub use routes::*;
pub use error::*;
