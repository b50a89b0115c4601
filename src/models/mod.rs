pub mod enums;
pub mod instance;
pub mod medicine;

pub use instance::*;
pub use medicine::*;
