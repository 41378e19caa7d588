//! Rules engine implementations.

pub mod chess;
