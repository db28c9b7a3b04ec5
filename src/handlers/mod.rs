pub mod console;
pub mod operations;
