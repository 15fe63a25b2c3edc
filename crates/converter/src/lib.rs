pub mod config;
pub mod error;
pub mod classifier;
pub mod backup;
pub mod command;
pub mod executor;
pub mod batch;

pub use config::BatchConfig;
pub use error::{ConfigError, ConvertError};
pub use command::{CommandBuilder, WatermarkSpec};
pub use executor::{EncoderRunner, EncodeOutput, FfmpegRunner};
pub use batch::{BatchRunner, BatchSummary, ConversionOutcome, WorkItem};
