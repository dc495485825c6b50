/// Utility modules
pub mod logging;
pub mod retry;
pub mod sanitization;
pub mod validation;

pub use logging::*;
pub use retry::*;
pub use sanitization::*;
pub use validation::*;
