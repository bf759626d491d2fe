//! Background remover implementations
//!
//! - Mock remover (deterministic synthetic mattes, always available)
//! - ONNX Runtime remover (U²-Net style models, GPU acceleration)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use self::mock::{MockMatte, MockRemover};

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxRemover, OnnxRemoverConfig};
