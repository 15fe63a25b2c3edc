use anyhow::{Context, Result};
use clap::Parser;
use converter::{BatchConfig, BatchRunner, FfmpegRunner};
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

/// Batch-convert videos to MP4 with an optional watermark
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input glob pattern (e.g. demo.avi, /videos/*, /videos/**/*)
    #[arg(long)]
    input: Option<String>,

    /// Output directory for converted files
    #[arg(long)]
    output: Option<PathBuf>,

    /// Watermark image path (overlay disabled when empty)
    #[arg(long)]
    watermark: Option<PathBuf>,

    /// Watermark width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Watermark height in pixels, -1 keeps the aspect ratio
    #[arg(long, allow_hyphen_values = true)]
    height: Option<i32>,

    /// Horizontal watermark position (pixels or expression, e.g. 10 or W-w-10)
    #[arg(short = 'x', allow_hyphen_values = true)]
    x: Option<String>,

    /// Vertical watermark position (pixels or expression, e.g. 10 or H-h-10)
    #[arg(short = 'y', allow_hyphen_values = true)]
    y: Option<String>,

    /// Maximum number of simultaneous conversions
    #[arg(long)]
    concurrency: Option<usize>,

    /// File size in bytes above which -preset veryslow -crf 28 is added
    #[arg(long = "crf-threshold")]
    crf_threshold: Option<u64>,

    /// Encoder binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Kill an encode that runs longer than this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply explicitly given flags on top of the loaded configuration
    fn apply(self, cfg: &mut BatchConfig) {
        if let Some(input) = self.input {
            cfg.input_pattern = input;
        }
        if let Some(output) = self.output {
            cfg.output_dir = output;
        }
        if let Some(watermark) = self.watermark {
            cfg.watermark_path = Some(watermark);
        }
        if let Some(width) = self.width {
            cfg.watermark_width = width;
        }
        if let Some(height) = self.height {
            cfg.watermark_height = height;
        }
        if let Some(x) = self.x {
            cfg.watermark_x = x;
        }
        if let Some(y) = self.y {
            cfg.watermark_y = y;
        }
        if let Some(concurrency) = self.concurrency {
            cfg.max_concurrency = concurrency;
        }
        if let Some(threshold) = self.crf_threshold {
            cfg.crf_threshold = threshold;
        }
        if let Some(ffmpeg) = self.ffmpeg {
            cfg.ffmpeg_bin = ffmpeg;
        }
        if let Some(timeout) = self.timeout {
            cfg.encode_timeout_secs = Some(timeout);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Use RUST_LOG when set, otherwise info (debug with --verbose)
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut cfg = BatchConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut cfg);

    info!("Input pattern: {}", cfg.input_pattern);
    info!("Output directory: {}", cfg.output_dir.display());
    match cfg.watermark() {
        Some(wm) => info!(
            "Watermark: {} ({}x{} at {},{})",
            wm.path.display(), wm.width, wm.height, wm.x, wm.y
        ),
        None => info!("Watermark: disabled"),
    }
    info!("Concurrency: {}, CRF threshold: {} bytes", cfg.max_concurrency, cfg.crf_threshold);

    let runner = FfmpegRunner::new(
        cfg.ffmpeg_bin.clone(),
        cfg.encode_timeout_secs.map(Duration::from_secs),
    );
    let batch = BatchRunner::new(cfg, runner);

    let summary = match batch.run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Conversion finished. Total: {}, succeeded: {}, failed: {}",
        summary.total, summary.succeeded, summary.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "vidconv",
            "--input", "/videos/*.avi",
            "--watermark", "logo.png",
            "--width", "200",
            "--height", "-1",
            "-x", "W-w-10",
            "-y", "10",
            "--concurrency", "2",
            "--crf-threshold", "1048576",
        ]);
        let mut cfg = BatchConfig::default();
        args.apply(&mut cfg);

        assert_eq!(cfg.input_pattern, "/videos/*.avi");
        assert_eq!(cfg.max_concurrency, 2);
        assert_eq!(cfg.crf_threshold, 1024 * 1024);
        let wm = cfg.watermark().unwrap();
        assert_eq!(wm.width, 200);
        assert_eq!(wm.height, -1);
        assert_eq!(wm.x, "W-w-10");
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let args = Args::parse_from(["vidconv"]);
        let mut cfg = BatchConfig {
            max_concurrency: 8,
            ..Default::default()
        };
        args.apply(&mut cfg);
        assert_eq!(cfg.max_concurrency, 8);
        assert_eq!(cfg.output_dir, PathBuf::from("./output"));
    }

    #[test]
    fn test_negative_concurrency_rejected_by_parser() {
        assert!(Args::try_parse_from(["vidconv", "--concurrency", "-1"]).is_err());
    }
}
