pub mod download;
pub mod text;
