pub mod linux;

pub use linux::*;
