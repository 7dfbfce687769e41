use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Generate a small test video using ffmpeg's lavfi test source.
/// Returns the path to the generated file (`<output_dir>/<name>.mp4`).
pub fn generate_test_video(output_dir: &Path, name: &str, duration_secs: f64) -> PathBuf {
    run_lavfi(
        output_dir,
        name,
        &format!("testsrc=duration={duration_secs}:size=320x240:rate=30"),
    )
}

/// Generate a video filled with a single color, e.g. `"red"`.
pub fn generate_solid_color_video(
    output_dir: &Path,
    name: &str,
    color: &str,
    duration_secs: f64,
) -> PathBuf {
    run_lavfi(
        output_dir,
        name,
        &format!("color=c={color}:duration={duration_secs}:size=320x240:rate=30"),
    )
}

/// Write a file with an `.mp4` name that no demuxer can read.
pub fn write_corrupt_video(output_dir: &Path, name: &str) -> PathBuf {
    let path = output_dir.join(format!("{name}.mp4"));
    std::fs::write(&path, b"definitely not an mp4 container")
        .expect("failed to write corrupt fixture");
    path
}

/// Get a temporary directory for test fixtures that persists for the test run.
pub fn fixture_dir() -> tempfile::TempDir {
    tempfile::TempDir::new().expect("failed to create temp dir for fixtures")
}

/// The origin string under which fixtures in `dir` are addressed.
pub fn origin_for(dir: &Path) -> String {
    dir.to_string_lossy().into_owned()
}

fn run_lavfi(output_dir: &Path, name: &str, source: &str) -> PathBuf {
    let output_path = output_dir.join(format!("{name}.mp4"));

    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-f",
            "lavfi",
            "-i",
            source,
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-preset",
            "ultrafast",
        ])
        .arg(&output_path)
        .stderr(Stdio::null())
        .status()
        .expect("ffmpeg must be installed to generate test fixtures");

    assert!(status.success(), "ffmpeg failed to generate test video {name}");
    assert!(output_path.exists(), "test video was not created: {name}");

    output_path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_video() {
        let dir = fixture_dir();
        let path = generate_test_video(dir.path(), "test_basic", 1.0);
        assert!(path.exists());
        let metadata = std::fs::metadata(&path).unwrap();
        assert!(metadata.len() > 0, "generated video should not be empty");
    }

    #[test]
    fn test_generate_solid_color_video() {
        let dir = fixture_dir();
        let path = generate_solid_color_video(dir.path(), "red", "red", 1.0);
        assert_eq!(path.file_name().unwrap(), "red.mp4");
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
