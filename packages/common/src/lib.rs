pub mod clock;
pub mod error;
pub mod merge;
pub mod path;

pub use clock::*;
pub use error::*;
pub use merge::*;
pub use path::*;
