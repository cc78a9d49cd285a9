pub mod category;
pub mod records;
pub mod profiles;
pub mod predictions;
pub mod error;

pub use category::*;
pub use records::*;
pub use profiles::*;
pub use predictions::*;
pub use error::*;
