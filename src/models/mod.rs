pub mod case;
pub mod conversation;
pub mod enums;
pub mod records;

pub use case::*;
pub use conversation::*;
pub use enums::*;
pub use records::*;
