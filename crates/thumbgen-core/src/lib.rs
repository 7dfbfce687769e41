pub mod error;
pub mod locator;
pub mod protocol;
pub mod task;
