pub mod common;
pub mod heap;
pub mod info;
pub mod strings;
