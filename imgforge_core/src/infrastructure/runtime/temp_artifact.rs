//! RAII guard for one pipeline stage's temp file, grounded on the teacher's
//! resource-cleanup-on-drop convention.
//!
//! Spec §4.4: "all temp files are named `<execution>_<mapping>_<stage>.<ext>`
//! and cleaned on pipeline exit." Every stage hands its output to the next
//! stage wrapped in a `TempArtifact`; whichever one is holding the path when
//! the pipeline unwinds (success, stage failure, or cancellation) deletes it
//! in `Drop`. `into_final_path` disarms the guard for the one artifact that
//! survives as the persisted output.

use std::path::{Path, PathBuf};

pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Builds the temp file name spec §4.4 mandates:
    /// `<execution>_<mapping>_<stage>.<ext>`.
    pub fn name_for(temp_dir: &Path, execution_id: i64, mapping_id: i64, stage: &str, ext: &str) -> PathBuf {
        temp_dir.join(format!("{execution_id}_{mapping_id}_{stage}.{ext}"))
    }

    /// Disarms the guard and returns the path, for the one artifact that
    /// becomes the persisted final output rather than being deleted.
    pub fn into_final_path(mut self) -> PathBuf {
        self.armed = false;
        self.path.clone()
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed && self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletes_file_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("1_2_download.png");
        std::fs::write(&path, b"fake image bytes").unwrap();

        {
            let _artifact = TempArtifact::new(path.clone());
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn into_final_path_survives_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("1_2_convert.jpg");
        std::fs::write(&path, b"fake image bytes").unwrap();

        let artifact = TempArtifact::new(path.clone());
        let final_path = artifact.into_final_path();
        assert_eq!(final_path, path);
        assert!(path.exists());
    }

    #[test]
    fn builds_spec_mandated_name() {
        let name = TempArtifact::name_for(Path::new("/tmp"), 7, 42, "enhance", "png");
        assert_eq!(name, PathBuf::from("/tmp/7_42_enhance.png"));
    }
}
