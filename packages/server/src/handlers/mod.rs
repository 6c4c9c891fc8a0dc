pub mod file;
pub mod sync;
