// Export modules for use in tests
pub mod directory_host;
pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use pdf::{DocumentSession, ViewerEvent};
pub use settings::ViewerOptions;
