//! Scoring backends
//!
//! Production scoring runs through the ONNX Runtime backend (feature
//! `onnx`); the mock scorers in [`test_utils`] stand in wherever tests need
//! deterministic predictions without model files.

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use onnx::{OnnxScorer, OnnxScorerFactory};
