//! Background remover abstraction
//!
//! The segmentation model is an external collaborator. The pipeline only sees
//! encoded bytes going in and encoded bytes with alpha coming out.

use crate::{config::ExecutionProvider, error::Result};

/// Black-box background removal
///
/// Implementations receive a losslessly encoded image (PNG) and return an
/// encoded image whose alpha channel marks the removed background. Any error,
/// and an empty output, is recorded by the batch as a per-item failure.
///
/// Calls are made from a blocking worker thread, so implementations may run
/// CPU-heavy inference directly.
pub trait BackgroundRemover: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str {
        "remover"
    }

    /// Remove the background from an encoded image
    ///
    /// # Errors
    /// - Input cannot be decoded by the remover
    /// - Model or runtime failure
    fn remove(&self, encoded_png: &[u8], device: ExecutionProvider) -> Result<Vec<u8>>;
}

impl<T: BackgroundRemover + ?Sized> BackgroundRemover for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn remove(&self, encoded_png: &[u8], device: ExecutionProvider) -> Result<Vec<u8>> {
        (**self).remove(encoded_png, device)
    }
}

impl<T: BackgroundRemover + ?Sized> BackgroundRemover for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn remove(&self, encoded_png: &[u8], device: ExecutionProvider) -> Result<Vec<u8>> {
        (**self).remove(encoded_png, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BgBatchError;
    use std::sync::Arc;

    struct Echo;

    impl BackgroundRemover for Echo {
        fn remove(&self, encoded_png: &[u8], _device: ExecutionProvider) -> Result<Vec<u8>> {
            Ok(encoded_png.to_vec())
        }
    }

    struct Refuses;

    impl BackgroundRemover for Refuses {
        fn name(&self) -> &str {
            "refuses"
        }

        fn remove(&self, _encoded_png: &[u8], device: ExecutionProvider) -> Result<Vec<u8>> {
            Err(BgBatchError::removal(format!("no {device} device")))
        }
    }

    #[test]
    fn test_trait_objects_forward() {
        let echo: Arc<dyn BackgroundRemover> = Arc::new(Echo);
        assert_eq!(echo.name(), "remover");
        assert_eq!(echo.remove(&[1, 2, 3], ExecutionProvider::Cpu).unwrap(), vec![1, 2, 3]);

        let boxed: Box<dyn BackgroundRemover> = Box::new(Refuses);
        assert_eq!(boxed.name(), "refuses");
        let err = boxed.remove(&[], ExecutionProvider::Cuda).unwrap_err();
        assert!(err.to_string().contains("cuda"));
    }
}
