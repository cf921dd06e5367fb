//! Command-line interface for spheroid segmentation

mod main;

pub use main::{main, Cli};
