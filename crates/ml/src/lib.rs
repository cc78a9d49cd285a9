pub mod models;
pub mod features;
pub mod training;
pub mod evaluation;
pub mod artifacts;

pub use models::*;
pub use features::*;
pub use training::*;
pub use evaluation::*;
pub use artifacts::*;
