use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, ImageFormat};

use bookdiff_core::ocr::UNIFORM_BLOCK_PSM;
use bookdiff_core::{OcrEngine, OcrError};

/// OCR through the `tesseract` command-line program.
///
/// Each image is written to a temporary PNG and recognized with
/// `tesseract <png> stdout -l <language> --psm 6`.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: PathBuf,
    language: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract", bookdiff_core::DEFAULT_OCR_LANGUAGE)
    }
}

impl TesseractOcr {
    pub fn new(program: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            language: language.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Whether the program can be started at all.
    pub fn is_available(&self) -> bool {
        let ok = Command::new(&self.program)
            .arg("--version")
            .output()
            .is_ok();
        if !ok {
            tracing::debug!(program = %self.program.display(), "tesseract not found");
        }
        ok
    }

    fn args(&self, image_path: &Path) -> Vec<OsString> {
        vec![
            image_path.as_os_str().to_owned(),
            "stdout".into(),
            "-l".into(),
            self.language.as_str().into(),
            "--psm".into(),
            UNIFORM_BLOCK_PSM.to_string().into(),
        ]
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let file = tempfile::Builder::new()
            .prefix("bookdiff-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .map_err(|e| OcrError::Encode(e.to_string()))?;

        let output = Command::new(&self.program)
            .args(self.args(file.path()))
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => OcrError::Unavailable(
                    format!("{}: {e}", self.program.display()),
                ),
                _ => OcrError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(status = %output.status, stderr = %stderr, "tesseract failed");
            return Err(OcrError::Failed(if stderr.is_empty() {
                format!("tesseract exited with {}", output.status)
            } else {
                stderr
            }));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        // Tesseract ends each page with a form feed.
        let text = text.trim_end_matches('\u{c}').to_string();
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            chars = text.chars().count(),
            "OCR complete"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn blank() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::new(4, 4))
    }

    #[test]
    fn arguments_use_uniform_block_mode() {
        let ocr = TesseractOcr::new("tesseract", "hin");
        let args = ocr.args(Path::new("/tmp/page.png"));
        let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();
        assert_eq!(args, vec!["/tmp/page.png", "stdout", "-l", "hin", "--psm", "6"]);
    }

    #[test]
    fn missing_program_is_unavailable() {
        let ocr = TesseractOcr::new("/nonexistent/bookdiff/tesseract", "eng");
        assert!(!ocr.is_available());
        let err = ocr.recognize(&blank()).unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn runs_program_and_reports_failures() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        };

        // $1 is the image, then: stdout -l <lang> --psm <mode>
        let echo = script("echo-tesseract", r#"test -s "$1" && printf 'lang=%s psm=%s\f' "$4" "$6""#);
        let text = TesseractOcr::new(&echo, "eng").recognize(&blank()).unwrap();
        assert_eq!(text, "lang=eng psm=6");

        let failing = script("failing-tesseract", "echo 'Error opening data file' >&2; exit 1");
        let err = TesseractOcr::new(&failing, "xyz").recognize(&blank()).unwrap_err();
        assert!(matches!(err, OcrError::Failed(ref msg) if msg == "Error opening data file"));
    }
}
