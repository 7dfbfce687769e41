pub mod capture;
pub mod decoder;
pub mod error;
pub mod jpeg;
pub mod surface;
