pub mod domain;
pub mod error;
pub mod lenient;
pub mod protocol;
