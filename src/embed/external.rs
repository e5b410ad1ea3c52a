use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::io::molfile;
use crate::model::geometry::Geometry;
use crate::process::{ToolCommand, ToolError};

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("failed to stage layout input: {0}")]
    Stage(#[source] crate::io::Error),

    #[error("layout tool output '{path}' is unreadable: {source}")]
    Output {
        path: PathBuf,
        source: crate::io::Error,
    },
}

/// Secondary 2D layout tool for structures the primary writer must not handle.
pub trait LayoutTool {
    /// Lays out `geometry` and writes the result to `output` as a molfile.
    fn layout(&self, name: &str, geometry: &Geometry, output: &Path) -> Result<(), LayoutError>;
}

/// Open Babel's `obabel`, run as `obabel <in.mol> -O <out.mol> -d --gen2D`.
#[derive(Debug, Clone)]
pub struct OpenBabelTool {
    program: PathBuf,
    timeout: Duration,
}

impl OpenBabelTool {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn command(&self, input: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(self.program.as_os_str(), self.timeout)
            .arg(input.as_os_str())
            .arg("-O")
            .arg(output.as_os_str())
            .args(["-d", "--gen2D"])
    }
}

impl LayoutTool for OpenBabelTool {
    fn layout(&self, name: &str, geometry: &Geometry, output: &Path) -> Result<(), LayoutError> {
        let staged = tempfile::Builder::new()
            .prefix("sforge-")
            .suffix(".mol")
            .tempfile()
            .map_err(|e| LayoutError::Stage(e.into()))?;
        {
            let mut writer = BufWriter::new(staged.as_file());
            molfile::write(&mut writer, name, geometry).map_err(LayoutError::Stage)?;
            writer.flush().map_err(|e| LayoutError::Stage(e.into()))?;
        }

        self.command(staged.path(), output).run()?;
        verify_output(output)
    }
}

/// Confirms a tool-written molfile parses.
pub fn verify_output(path: &Path) -> Result<(), LayoutError> {
    let output_err = |source| LayoutError::Output {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(|e| output_err(crate::io::Error::file(path, e)))?;
    molfile::read(BufReader::new(file)).map_err(output_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::geometry::Dimensionality;
    use crate::smiles::parse;
    use tempfile::TempDir;

    #[test]
    fn builds_argument_vector() {
        let tool = OpenBabelTool::new("obabel", Duration::from_secs(5));
        let cmd = tool.command(Path::new("in.mol"), Path::new("out.mol"));
        assert_eq!(cmd.command_line(), "obabel in.mol -O out.mol -d --gen2D");
    }

    #[test]
    fn missing_program_surfaces_as_tool_error() {
        let dir = TempDir::new().unwrap();
        let mol = parse("CCO").unwrap();
        let n = mol.atom_count();
        let geometry = Geometry::new(mol, vec![[0.0; 3]; n], Dimensionality::Two);
        let tool = OpenBabelTool::new("no-such-obabel-binary", Duration::from_secs(5));
        let err = tool
            .layout("x", &geometry, &dir.path().join("x.mol"))
            .unwrap_err();
        assert!(matches!(err, LayoutError::Tool(ToolError::Spawn { .. })));
    }

    #[test]
    fn verify_rejects_garbage_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.mol");
        std::fs::write(&path, "not a molfile").unwrap();
        assert!(matches!(
            verify_output(&path),
            Err(LayoutError::Output { .. })
        ));
        assert!(verify_output(&dir.path().join("absent.mol")).is_err());
    }
}
