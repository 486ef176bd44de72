pub mod diagnostics;
pub mod health;

pub use diagnostics::*;
pub use health::*;
