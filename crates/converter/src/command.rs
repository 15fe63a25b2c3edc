use std::ffi::OsString;
use std::path::PathBuf;
use crate::batch::WorkItem;
use crate::config::BatchConfig;

/// H.264 encoder used for every output
pub const VIDEO_CODEC: &str = "libx264";
/// Preset used for inputs above the size threshold
pub const SLOW_PRESET: &str = "veryslow";
/// CRF used for inputs above the size threshold
pub const LARGE_FILE_CRF: u8 = 28;

/// Watermark overlay settings
///
/// `height` of -1 and the `x`/`y` position expressions are handed to the
/// encoder untouched; it resolves them itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkSpec {
    pub path: PathBuf,
    pub width: u32,
    pub height: i32,
    pub x: String,
    pub y: String,
}

/// Filter graph scaling the watermark (input 1) and overlaying it on input 0
pub fn filter_graph(wm: &WatermarkSpec) -> String {
    format!(
        "[1:v] scale={}:{} [wm]; [0:v][wm] overlay={}:{}",
        wm.width, wm.height, wm.x, wm.y
    )
}

/// Command builder for generating encoder argument lists
pub struct CommandBuilder;

impl CommandBuilder {
    /// Create a new command builder
    pub fn new() -> Self {
        CommandBuilder
    }

    /// Build the encoder arguments for one work item
    ///
    /// Without a watermark this is a plain transcode to H.264 with the audio
    /// copied. With one, the image becomes a second input, is scaled and
    /// overlaid, and the output stops at the shorter input. Either way,
    /// inputs strictly larger than `crf_threshold` get the slow preset and
    /// CRF 28.
    pub fn build_args(&self, item: &WorkItem, cfg: &BatchConfig) -> Vec<OsString> {
        let mut args = Vec::new();

        args.push("-i".into());
        args.push(item.input_path.clone().into_os_string());

        let watermark = cfg.watermark();
        if let Some(wm) = &watermark {
            args.push("-i".into());
            args.push(wm.path.clone().into_os_string());
            args.push("-filter_complex".into());
            args.push(filter_graph(wm).into());
        }

        args.push("-c:v".into());
        args.push(VIDEO_CODEC.into());
        args.push("-c:a".into());
        args.push("copy".into());

        if watermark.is_some() {
            args.push("-shortest".into());
        }

        if item.file_size > cfg.crf_threshold {
            args.push("-preset".into());
            args.push(SLOW_PRESET.into());
            args.push("-crf".into());
            args.push(LARGE_FILE_CRF.to_string().into());
        }

        args.push(item.output_path.clone().into_os_string());

        args
    }
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    fn item(size: u64) -> WorkItem {
        WorkItem {
            input_path: PathBuf::from("/in/clip.avi"),
            output_path: PathBuf::from("/out/clip.mp4"),
            file_size: size,
        }
    }

    fn lossy(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn has_quality_flags(args: &[OsString]) -> bool {
        lossy(args)
            .windows(4)
            .any(|w| w == ["-preset", "veryslow", "-crf", "28"])
    }

    #[test]
    fn test_plain_transcode_small_file() {
        let cfg = BatchConfig::default();
        let args = lossy(&CommandBuilder::new().build_args(&item(5 * MIB), &cfg));
        assert_eq!(
            args,
            vec!["-i", "/in/clip.avi", "-c:v", "libx264", "-c:a", "copy", "/out/clip.mp4"]
        );
    }

    #[test]
    fn test_plain_transcode_large_file() {
        let cfg = BatchConfig::default();
        let args = lossy(&CommandBuilder::new().build_args(&item(15 * MIB), &cfg));
        assert_eq!(
            args,
            vec![
                "-i", "/in/clip.avi", "-c:v", "libx264", "-c:a", "copy",
                "-preset", "veryslow", "-crf", "28", "/out/clip.mp4",
            ]
        );
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        let cfg = BatchConfig::default();
        let builder = CommandBuilder::new();
        assert!(!has_quality_flags(&builder.build_args(&item(cfg.crf_threshold), &cfg)));
        assert!(has_quality_flags(&builder.build_args(&item(cfg.crf_threshold + 1), &cfg)));
    }

    #[test]
    fn test_watermark_filter_passed_verbatim() {
        let cfg = BatchConfig {
            watermark_path: Some(PathBuf::from("/wm/logo.png")),
            watermark_width: 200,
            watermark_height: -1,
            watermark_x: "W-w-10".to_string(),
            watermark_y: "10".to_string(),
            ..Default::default()
        };
        let args = lossy(&CommandBuilder::new().build_args(&item(MIB), &cfg));

        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("scale=200:-1"));
        assert!(filter.contains("overlay=W-w-10:10"));
        assert_eq!(
            args,
            vec![
                "-i", "/in/clip.avi", "-i", "/wm/logo.png",
                "-filter_complex", "[1:v] scale=200:-1 [wm]; [0:v][wm] overlay=W-w-10:10",
                "-c:v", "libx264", "-c:a", "copy", "-shortest", "/out/clip.mp4",
            ]
        );
    }

    #[test]
    fn test_watermark_large_file_gets_quality_flags() {
        let cfg = BatchConfig {
            watermark_path: Some(PathBuf::from("logo.png")),
            watermark_x: "(W-w)/2".to_string(),
            watermark_y: "H-h-10".to_string(),
            ..Default::default()
        };
        let raw = CommandBuilder::new().build_args(&item(20 * MIB), &cfg);
        assert!(has_quality_flags(&raw));
        let args = lossy(&raw);
        assert!(args.iter().any(|a| a.contains("overlay=(W-w)/2:H-h-10")));
        assert_eq!(args.last().unwrap(), "/out/clip.mp4");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_paths_passed_byte_for_byte() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let input = PathBuf::from(OsStr::from_bytes(b"/in/v\xff.avi"));
        let output = PathBuf::from(OsStr::from_bytes(b"/out/v\xff.mp4"));
        let logo = PathBuf::from(OsStr::from_bytes(b"/wm/\xe9.png"));
        let cfg = BatchConfig {
            watermark_path: Some(logo.clone()),
            ..Default::default()
        };
        let work = WorkItem {
            input_path: input.clone(),
            output_path: output.clone(),
            file_size: 1,
        };

        let args = CommandBuilder::new().build_args(&work, &cfg);

        assert_eq!(args[1], input.into_os_string());
        assert_eq!(args[3], logo.into_os_string());
        assert_eq!(args.last().unwrap(), &output.into_os_string());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Larger inputs never lose the slow preset once a smaller one has it
        #[test]
        fn test_quality_flags_monotone_in_size(
            threshold in 0u64..(1 << 40),
            a in 0u64..(1 << 41),
            b in 0u64..(1 << 41),
            watermark in any::<bool>(),
        ) {
            let cfg = BatchConfig {
                crf_threshold: threshold,
                watermark_path: watermark.then(|| PathBuf::from("logo.png")),
                ..Default::default()
            };
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            let builder = CommandBuilder::new();
            let small_flags = has_quality_flags(&builder.build_args(&item(small), &cfg));
            let large_flags = has_quality_flags(&builder.build_args(&item(large), &cfg));

            prop_assert_eq!(small_flags, small > threshold);
            prop_assert_eq!(large_flags, large > threshold);
            prop_assert!(!small_flags || large_flags);
        }
    }
}
