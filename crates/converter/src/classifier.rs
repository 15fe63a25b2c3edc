use std::ffi::OsStr;
use std::path::Path;

/// Video file extensions accepted for conversion (matched case-insensitively)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "flv", "wmv"];

/// Text after the last `.` of the file name
///
/// Unlike `Path::extension`, a name that is only a dot and a suffix (`.mp4`)
/// counts as having that extension.
pub fn extension(path: &Path) -> Option<&OsStr> {
    path.extension().or_else(|| {
        let name = path.file_name()?.to_str()?;
        name.strip_prefix('.').filter(|ext| !ext.is_empty()).map(OsStr::new)
    })
}

/// Check whether a path looks like a video file by its extension
pub fn is_video(path: &Path) -> bool {
    extension(path)
        .and_then(|s| s.to_str())
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
