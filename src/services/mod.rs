//! Service layer: codec, validation, file I/O and progress reporting

pub mod codec;
pub mod io;
pub mod progress;
pub mod validation;

pub use codec::ImageCodec;
pub use io::ImageIOService;
pub use progress::{
    BatchProcessingStats, ConsoleProgressReporter, ItemProgressUpdate, NoOpProgressReporter,
    ProcessingStage, ProgressReporter,
};
pub use validation::ImageValidator;
