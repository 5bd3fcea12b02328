//! Shared harness for the HTTP API integration tests

pub mod app;
pub mod logging;

pub use app::TestApp;
pub use logging::init_test_logging;
