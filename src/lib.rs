pub mod config;
pub mod describe;
pub mod dsl;
pub mod error;
pub mod image;
pub mod util;
