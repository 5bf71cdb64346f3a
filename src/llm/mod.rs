pub mod client;
pub mod decoder;
pub mod tools;
