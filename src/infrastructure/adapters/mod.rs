//! Host adapters

pub mod console;
