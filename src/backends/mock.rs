//! Deterministic background remover for tests, demos and benchmarks
//!
//! Produces synthetic mattes without any model so pipelines can be exercised
//! end to end. Every call is recorded for verification.

use crate::{
    config::ExecutionProvider,
    error::{BgBatchError, Result},
    remover::BackgroundRemover,
    services::ImageCodec,
    types::ImageAsset,
};
use image::Rgba;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// What the mock writes into the alpha channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockMatte {
    /// Return the input bytes untouched (no alpha for RGB inputs)
    Passthrough,
    /// Keep every pixel (alpha 255)
    Opaque,
    /// Remove every pixel (alpha 0)
    Transparent,
    /// Soft-edged circle centered in the image
    Circle,
    /// Fixed alpha for every pixel
    Uniform(u8),
    /// Fail with the given message
    Fail(String),
    /// Succeed with zero bytes
    Empty,
    /// Succeed with bytes that are not an image
    Garbage,
}

/// Mock remover with configurable matte, failures and latency
#[derive(Debug, Clone)]
pub struct MockRemover {
    matte: MockMatte,
    delay: Option<Duration>,
    /// Fail only on these call numbers (0-based), regardless of `matte`
    fail_on_calls: Vec<usize>,
    calls: Arc<AtomicUsize>,
    call_history: Arc<Mutex<Vec<ExecutionProvider>>>,
}

impl MockRemover {
    #[must_use]
    pub fn new(matte: MockMatte) -> Self {
        Self {
            matte,
            delay: None,
            fail_on_calls: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Circle matte, the closest stand-in for a real segmentation
    #[must_use]
    pub fn circle() -> Self {
        Self::new(MockMatte::Circle)
    }

    #[must_use]
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self::new(MockMatte::Fail(message.into()))
    }

    /// Sleep this long before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail on the given call numbers only
    #[must_use]
    pub fn failing_on_calls(mut self, calls: &[usize]) -> Self {
        self.fail_on_calls = calls.to_vec();
        self
    }

    /// Number of `remove` calls so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Device hints received, in call order
    #[must_use]
    pub fn call_history(&self) -> Vec<ExecutionProvider> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn alpha_at(&self, x: u32, y: u32, width: u32, height: u32) -> u8 {
        match self.matte {
            MockMatte::Opaque => 255,
            MockMatte::Transparent => 0,
            MockMatte::Uniform(alpha) => alpha,
            MockMatte::Circle => {
                let center_x = width as f32 / 2.0;
                let center_y = height as f32 / 2.0;
                let radius = (width.min(height) as f32 / 3.0).max(1.0);
                let dx = x as f32 + 0.5 - center_x;
                let dy = y as f32 + 0.5 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                let value = ((radius - distance) / radius).clamp(0.0, 1.0);
                (value * 255.0).round() as u8
            },
            _ => 255,
        }
    }
}

impl Default for MockRemover {
    fn default() -> Self {
        Self::circle()
    }
}

impl BackgroundRemover for MockRemover {
    fn name(&self) -> &str {
        "mock"
    }

    fn remove(&self, encoded_png: &[u8], device: ExecutionProvider) -> Result<Vec<u8>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut history) = self.call_history.lock() {
            history.push(device);
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.fail_on_calls.contains(&call) {
            return Err(BgBatchError::removal(format!("mock failure on call {call}")));
        }

        match &self.matte {
            MockMatte::Fail(message) => return Err(BgBatchError::removal(message.clone())),
            MockMatte::Empty => return Ok(Vec::new()),
            MockMatte::Garbage => return Ok(b"not an image".to_vec()),
            MockMatte::Passthrough => return Ok(encoded_png.to_vec()),
            _ => {},
        }

        let input = ImageCodec::decode(encoded_png)?;
        let (width, height) = input.dimensions();
        let mut rgba = input.to_rgba();
        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            let Rgba([r, g, b, _]) = *pixel;
            *pixel = Rgba([r, g, b, self.alpha_at(x, y, width, height)]);
        }

        ImageCodec::encode_png(&ImageAsset::from_rgba(rgba))
    }
}
