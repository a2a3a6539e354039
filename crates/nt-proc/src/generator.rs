//! Invocation of the external network generator.

use std::path::{Path, PathBuf};
use std::process::Command;

use nt_types::GenerationError;
use tracing::{debug, info};

/// Runs `<generator> <config-file> <replica-count>` and verifies the
/// promised artifact. The generator drops artifacts in its working
/// directory, named `<config-stem>_<replica-index>.<ext>`.
#[derive(Debug, Clone)]
pub struct Generator {
    program: PathBuf,
    artifact_dir: PathBuf,
    artifact_ext: String,
}

impl Generator {
    pub fn new(program: impl Into<PathBuf>, artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            artifact_dir: artifact_dir.into(),
            artifact_ext: "nn".to_string(),
        }
    }

    /// Where the generator will place the artifact for `replica`.
    pub fn expected_artifact(&self, config_path: &Path, replica: u32) -> PathBuf {
        let stem = config_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "network".to_string());
        self.artifact_dir
            .join(format!("{stem}_{replica}.{}", self.artifact_ext))
    }

    /// Generate one trainable artifact from a materialized config. Success
    /// requires both a zero exit code and the artifact on disk.
    pub fn generate(&self, config_path: &Path) -> Result<PathBuf, GenerationError> {
        debug!(config = %config_path.display(), "invoking generator");

        let output = Command::new(&self.program)
            .arg(config_path)
            .arg("1")
            .current_dir(&self.artifact_dir)
            .output()
            .map_err(|e| GenerationError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(GenerationError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let artifact = self.expected_artifact(config_path, 1);
        if !artifact.exists() {
            return Err(GenerationError::MissingArtifact(
                artifact.display().to_string(),
            ));
        }

        info!(artifact = %artifact.display(), "network generated");
        Ok(artifact)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn successful_generation_returns_artifact_path() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "gen.sh",
            "#!/bin/sh\nstem=$(basename \"$1\")\ntouch \"${stem%.*}_1.nn\"\n",
        );
        let config = dir.path().join("trial_4.conf");
        fs::write(&config, "[hyperparameters]\n").unwrap();

        let generator = Generator::new(&script, dir.path());
        let artifact = generator.generate(&config).unwrap();

        assert_eq!(artifact, dir.path().join("trial_4_1.nn"));
        assert!(artifact.exists());
    }

    #[test]
    fn nonzero_exit_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "gen.sh",
            "#!/bin/sh\necho 'invalid layer width' >&2\nexit 3\n",
        );
        let config = dir.path().join("trial_0.conf");
        fs::write(&config, "").unwrap();

        let generator = Generator::new(&script, dir.path());
        match generator.generate(&config) {
            Err(GenerationError::NonZeroExit { code, stderr }) => {
                assert_eq!(code, 3);
                assert!(stderr.contains("invalid layer width"));
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[test]
    fn clean_exit_without_artifact_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "gen.sh", "#!/bin/sh\nexit 0\n");
        let config = dir.path().join("trial_1.conf");
        fs::write(&config, "").unwrap();

        let generator = Generator::new(&script, dir.path());
        assert!(matches!(
            generator.generate(&config),
            Err(GenerationError::MissingArtifact(_))
        ));
    }

    #[test]
    fn missing_program_is_a_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("trial_2.conf");
        fs::write(&config, "").unwrap();

        let generator = Generator::new(dir.path().join("no_such_generator"), dir.path());
        assert!(matches!(
            generator.generate(&config),
            Err(GenerationError::Spawn(_))
        ));
    }
}
