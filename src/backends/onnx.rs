//! ONNX Runtime background remover
//!
//! Runs a U²-Net style salient-object model: the image is resized to the
//! model's square input, normalized, and the predicted matte is stretched back
//! to the original size and written into the alpha channel.

use crate::{
    config::ExecutionProvider,
    error::{BgBatchError, Result},
    remover::BackgroundRemover,
    services::ImageCodec,
    types::ImageAsset,
};
use image::{imageops::FilterType, GrayImage, Luma};
use ndarray::Array4;
use ort::ep::{
    CoreML as CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    CUDA as CUDAExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Environment variable naming the directory that holds `u2net.onnx`
pub const MODEL_HOME_ENV: &str = "U2NET_HOME";

/// Default model file name
pub const DEFAULT_MODEL_FILE: &str = "u2net.onnx";

/// Settings for [`OnnxRemover`]
#[derive(Debug, Clone, PartialEq)]
pub struct OnnxRemoverConfig {
    /// Path to the `.onnx` model file
    pub model_path: PathBuf,
    /// Square input size the model expects
    pub input_size: u32,
    /// Per-channel normalization mean (RGB)
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB)
    pub std: [f32; 3],
    /// Intra-op threads (0 = all available cores)
    pub intra_threads: usize,
}

impl Default for OnnxRemoverConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            input_size: 320,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            intra_threads: 0,
        }
    }
}

/// `$U2NET_HOME/u2net.onnx`, falling back to `~/.u2net/u2net.onnx`
#[must_use]
pub fn default_model_path() -> PathBuf {
    let home = std::env::var_os(MODEL_HOME_ENV)
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".u2net")))
        .unwrap_or_else(|| PathBuf::from(".u2net"));
    home.join(DEFAULT_MODEL_FILE)
}

/// Background remover backed by ONNX Runtime
///
/// The session is created on first use and rebuilt only when a different
/// device hint arrives. Calls are serialized on the session.
pub struct OnnxRemover {
    config: OnnxRemoverConfig,
    session: Mutex<Option<(ExecutionProvider, Session)>>,
}

impl std::fmt::Debug for OnnxRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxRemover")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OnnxRemover {
    /// Create a remover for an existing model file
    ///
    /// # Errors
    /// - Model file missing
    /// - Input size of zero
    pub fn new(config: OnnxRemoverConfig) -> Result<Self> {
        if config.input_size == 0 {
            return Err(BgBatchError::config_value_error(
                "model input size",
                0,
                "1-4096",
                Some(320),
            ));
        }
        if !config.model_path.is_file() {
            let env_hint = format!("place {DEFAULT_MODEL_FILE} in ${MODEL_HOME_ENV}");
            return Err(BgBatchError::model_error_with_context(
                "locate",
                &config.model_path,
                "file not found",
                &["pass --model <path>", env_hint.as_str(), "download it into ~/.u2net"],
            ));
        }
        Ok(Self {
            config,
            session: Mutex::new(None),
        })
    }

    /// Create a remover for the model at `path` with default settings
    ///
    /// # Errors
    /// Model file missing
    pub fn from_model_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(OnnxRemoverConfig {
            model_path: path.as_ref().to_path_buf(),
            ..OnnxRemoverConfig::default()
        })
    }

    #[must_use]
    pub fn config(&self) -> &OnnxRemoverConfig {
        &self.config
    }

    /// List ONNX Runtime execution providers with availability and description
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgremove_batch::backends::OnnxRemover;
    ///
    /// for (name, available, description) in OnnxRemover::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    fn build_session(&self, device: ExecutionProvider) -> Result<Session> {
        let load_start = instant::Instant::now();
        let model_data = std::fs::read(&self.config.model_path)
            .map_err(|e| BgBatchError::file_io_error("read model", &self.config.model_path, &e))?;

        let mut builder = Session::builder()
            .map_err(|e| BgBatchError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| BgBatchError::model(format!("Failed to set optimization level: {e}")))?;

        let cuda = CUDAExecutionProvider::default();
        let coreml = CoreMLExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match device {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml.with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::debug!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    providers.push(cuda.build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    providers.push(coreml.with_subgraphs(true).build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
        }

        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                BgBatchError::model(format!("Failed to set {device} execution provider: {e}"))
            })?;
        }

        let intra_threads = if self.config.intra_threads > 0 {
            self.config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgBatchError::model(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgBatchError::model_error_with_context(
                    "load",
                    &self.config.model_path,
                    &e.to_string(),
                    &["verify the file is a valid ONNX model"],
                )
            })?;

        log::info!(
            "📊 Model loaded from {} in {:.0}ms ({intra_threads} intra-op threads)",
            self.config.model_path.display(),
            load_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(session)
    }

    /// Resize, scale by the brightest value and normalize into an NCHW tensor
    fn preprocess(&self, asset: &ImageAsset) -> Array4<f32> {
        let size = self.config.input_size;
        let rgb = image::imageops::resize(
            &asset.as_dynamic().to_rgb8(),
            size,
            size,
            FilterType::Lanczos3,
        );

        let max_value = f32::from(rgb.pixels().flat_map(|p| p.0).max().unwrap_or(0)).max(1e-6);
        let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / max_value;
                tensor[[0, channel, y as usize, x as usize]] =
                    (value - self.config.mean[channel]) / self.config.std[channel];
            }
        }
        tensor
    }

    /// Stretch the raw prediction to 0..=255 and resample it to `width`x`height`
    fn matte_from_prediction(
        prediction: &[f32],
        pred_width: u32,
        pred_height: u32,
        width: u32,
        height: u32,
    ) -> Result<GrayImage> {
        let (min, max) = prediction
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = (max - min).max(f32::EPSILON);

        let pixels: Vec<u8> = prediction
            .iter()
            .map(|&v| (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        let matte = GrayImage::from_raw(pred_width, pred_height, pixels).ok_or_else(|| {
            BgBatchError::processing(format!(
                "Prediction does not fill a {pred_width}x{pred_height} matte"
            ))
        })?;

        Ok(image::imageops::resize(&matte, width, height, FilterType::Lanczos3))
    }
}

impl BackgroundRemover for OnnxRemover {
    fn name(&self) -> &str {
        "onnx"
    }

    fn remove(&self, encoded_png: &[u8], device: ExecutionProvider) -> Result<Vec<u8>> {
        let input = ImageCodec::decode(encoded_png)?;
        let (width, height) = input.dimensions();
        let tensor = self.preprocess(&input);

        let mut guard = self
            .session
            .lock()
            .map_err(|_| BgBatchError::internal("ONNX session lock poisoned"))?;
        if guard.as_ref().map(|(built_for, _)| *built_for) != Some(device) {
            *guard = Some((device, self.build_session(device)?));
        }
        let (_, session) = guard
            .as_mut()
            .ok_or_else(|| BgBatchError::internal("ONNX session not initialized"))?;

        let inference_start = instant::Instant::now();
        let input_value = Value::from_array(tensor)
            .map_err(|e| BgBatchError::removal(format!("Failed to convert input tensor: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgBatchError::removal(format!("ONNX inference failed: {e}")))?;

        let (prediction, pred_width, pred_height) = {
            let first_key = outputs
                .keys()
                .next()
                .ok_or_else(|| BgBatchError::removal("No output tensors found"))?;
            let output = outputs
                .get(first_key)
                .ok_or_else(|| BgBatchError::removal("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| BgBatchError::removal(format!("Failed to extract output tensor: {e}")))?;

            let shape = output.shape();
            if shape.len() < 2 {
                return Err(BgBatchError::removal(format!(
                    "Expected at least a 2D output tensor, got {}D",
                    shape.len()
                )));
            }
            let pred_height = shape[shape.len() - 2];
            let pred_width = shape[shape.len() - 1];
            let values: Vec<f32> = output.iter().copied().take(pred_width * pred_height).collect();
            (values, pred_width as u32, pred_height as u32)
        };
        drop(outputs);
        drop(guard);

        log::debug!(
            "⚡ Inference: {:.2}ms for {width}x{height} input",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        let matte = Self::matte_from_prediction(&prediction, pred_width, pred_height, width, height)?;
        let mut rgba = input.to_rgba();
        for (pixel, Luma([alpha])) in rgba.pixels_mut().zip(matte.pixels()) {
            pixel[3] = *alpha;
        }

        ImageCodec::encode_png(&ImageAsset::from_rgba(rgba))
    }
}
