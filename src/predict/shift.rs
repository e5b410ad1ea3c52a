//! External NMR shift predictor.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use super::Error;
use crate::model::representation::Nucleus;
use crate::process::ToolCommand;

/// Batch predictor that turns a directory of molfiles into one CSV of
/// predicted shifts per structure.
pub trait ShiftPredictor {
    fn predict(&self, geometry_dir: &Path, nucleus: Nucleus, output_dir: &Path) -> Result<(), Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorClass {
    pub main_class: String,
    pub jar: PathBuf,
    /// Java source compiled before each run when compilation is enabled.
    #[serde(default)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShiftPredictorConfig {
    pub program: PathBuf,
    pub jvm_args: Vec<String>,
    /// Shared classpath entries, appended after the nucleus jar.
    pub classpath: Vec<PathBuf>,
    pub proton: PredictorClass,
    pub carbon: PredictorClass,
    pub solvent: String,
    /// Whether the predictor may use 3D descriptors.
    pub use_3d: bool,
    /// Compile the batch processor sources with `compiler` before running them.
    pub compile: bool,
    pub compiler: PathBuf,
    pub compiler_args: Vec<String>,
    /// Directory the compiled classes are written to (`javac -d`).
    pub class_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for ShiftPredictorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("java"),
            jvm_args: vec!["-Xmx1g".to_string()],
            classpath: vec![
                PathBuf::from("predictor/cdk-2.9.jar"),
                PathBuf::from("."),
                PathBuf::from("predictor"),
            ],
            proton: PredictorClass {
                main_class: "predictor.BatchProcessor1H".to_string(),
                jar: PathBuf::from("predictor/predictorh.jar"),
                source: Some(PathBuf::from("predictor/BatchProcessor1H.java")),
            },
            carbon: PredictorClass {
                main_class: "predictor.BatchProcessor13C".to_string(),
                jar: PathBuf::from("predictor/predictorc.jar"),
                source: Some(PathBuf::from("predictor/BatchProcessor13C.java")),
            },
            solvent: "Dimethylsulphoxide-D6 (DMSO-D6, C2D6SO)".to_string(),
            use_3d: true,
            compile: true,
            compiler: PathBuf::from("javac"),
            compiler_args: vec![
                "-Xlint:-options".to_string(),
                "-Xlint:deprecation".to_string(),
                "-proc:none".to_string(),
            ],
            class_dir: PathBuf::from("."),
            timeout_secs: 3600,
        }
    }
}

impl ShiftPredictorConfig {
    pub fn class_for(&self, nucleus: Nucleus) -> &PredictorClass {
        match nucleus {
            Nucleus::Proton => &self.proton,
            Nucleus::Carbon => &self.carbon,
        }
    }

    /// The nucleus jar followed by the shared entries, joined with the platform separator.
    pub fn classpath_for(&self, nucleus: Nucleus) -> Result<OsString, Error> {
        let entries = std::iter::once(&self.class_for(nucleus).jar).chain(&self.classpath);
        std::env::join_paths(entries).map_err(Error::ClassPath)
    }
}

/// Runs the Java batch processor for one nucleus.
#[derive(Debug, Clone)]
pub struct JavaShiftPredictor {
    config: ShiftPredictorConfig,
}

impl JavaShiftPredictor {
    pub fn new(config: ShiftPredictorConfig) -> Self {
        Self { config }
    }

    /// The compiler invocation for `nucleus`, if compilation is enabled and
    /// the nucleus has a source file.
    pub fn compile_command(&self, nucleus: Nucleus) -> Result<Option<ToolCommand>, Error> {
        let config = &self.config;
        let Some(source) = config.class_for(nucleus).source.as_ref().filter(|_| config.compile) else {
            return Ok(None);
        };
        let command = ToolCommand::new(config.compiler.as_os_str(), Duration::from_secs(config.timeout_secs))
            .arg("-classpath")
            .arg(config.classpath_for(nucleus)?)
            .arg("-d")
            .arg(config.class_dir.as_os_str())
            .args(&config.compiler_args)
            .arg(source.as_os_str());
        Ok(Some(command))
    }

    pub fn command(&self, geometry_dir: &Path, nucleus: Nucleus, output_dir: &Path) -> Result<ToolCommand, Error> {
        let config = &self.config;
        let mut command = ToolCommand::new(config.program.as_os_str(), Duration::from_secs(config.timeout_secs))
            .args(&config.jvm_args)
            .arg("-classpath")
            .arg(config.classpath_for(nucleus)?)
            .arg(config.class_for(nucleus).main_class.as_str())
            .arg(geometry_dir.as_os_str())
            .arg(output_dir.as_os_str())
            .arg(config.solvent.as_str());
        if !config.use_3d {
            command = command.arg("no3d");
        }
        Ok(command)
    }
}

impl ShiftPredictor for JavaShiftPredictor {
    fn predict(&self, geometry_dir: &Path, nucleus: Nucleus, output_dir: &Path) -> Result<(), Error> {
        fs::create_dir_all(output_dir).map_err(|source| Error::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;
        if let Some(compile) = self.compile_command(nucleus)? {
            info!(nucleus = nucleus.tag(), "compiling shift predictor");
            compile.run().map_err(|source| Error::Tool { nucleus, source })?;
        }
        info!(nucleus = nucleus.tag(), input = %geometry_dir.display(), "running shift predictor");
        self.command(geometry_dir, nucleus, output_dir)?
            .run()
            .map_err(|source| Error::Tool { nucleus, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_argument_vector_without_shell_quoting() {
        let predictor = JavaShiftPredictor::new(ShiftPredictorConfig::default());
        let cmd = predictor
            .command(Path::new("mols"), Nucleus::Carbon, Path::new("predicted_spectra_13C"))
            .unwrap();
        let line = cmd.command_line();
        assert!(line.starts_with("java -Xmx1g -classpath predictor/predictorc.jar"));
        assert!(line.contains(" predictor.BatchProcessor13C mols predicted_spectra_13C "));
        assert!(line.ends_with("Dimethylsulphoxide-D6 (DMSO-D6, C2D6SO)"));
    }

    #[test]
    fn disabling_3d_appends_flag() {
        let config = ShiftPredictorConfig {
            use_3d: false,
            ..Default::default()
        };
        let cmd = JavaShiftPredictor::new(config)
            .command(Path::new("m"), Nucleus::Proton, Path::new("o"))
            .unwrap();
        assert!(cmd.command_line().ends_with(" no3d"));
        assert!(cmd.command_line().contains("predictor.BatchProcessor1H"));
    }

    #[test]
    fn classpath_starts_with_nucleus_jar() {
        let config = ShiftPredictorConfig::default();
        let joined = config.classpath_for(Nucleus::Proton).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(parts[0], PathBuf::from("predictor/predictorh.jar"));
        assert_eq!(parts.len(), 4);
    }

    #[test]
    fn compiles_nucleus_source_before_running() {
        let predictor = JavaShiftPredictor::new(ShiftPredictorConfig::default());
        let cmd = predictor.compile_command(Nucleus::Proton).unwrap().unwrap();
        let line = cmd.command_line();
        assert!(line.starts_with("javac -classpath predictor/predictorh.jar"));
        assert!(line.contains(" -d . -Xlint:-options -Xlint:deprecation -proc:none "));
        assert!(line.ends_with("predictor/BatchProcessor1H.java"));
    }

    #[test]
    fn precompiled_classes_skip_the_compiler() {
        let config = ShiftPredictorConfig {
            compile: false,
            ..Default::default()
        };
        let predictor = JavaShiftPredictor::new(config);
        assert!(predictor.compile_command(Nucleus::Carbon).unwrap().is_none());

        let mut config = ShiftPredictorConfig::default();
        config.carbon.source = None;
        let predictor = JavaShiftPredictor::new(config);
        assert!(predictor.compile_command(Nucleus::Carbon).unwrap().is_none());
        assert!(predictor.compile_command(Nucleus::Proton).unwrap().is_some());
    }

    #[test]
    fn missing_compiler_is_a_tool_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ShiftPredictorConfig {
            compiler: dir.path().join("no-such-javac"),
            ..Default::default()
        };
        let err = JavaShiftPredictor::new(config)
            .predict(dir.path(), Nucleus::Carbon, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, Error::Tool { nucleus: Nucleus::Carbon, .. }));
    }

    #[test]
    fn missing_program_is_a_tool_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ShiftPredictorConfig {
            program: dir.path().join("no-such-java"),
            compile: false,
            ..Default::default()
        };
        let err = JavaShiftPredictor::new(config)
            .predict(dir.path(), Nucleus::Proton, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, Error::Tool { nucleus: Nucleus::Proton, .. }));
    }
}
