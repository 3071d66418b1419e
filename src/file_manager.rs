// src/file_manager.rs - job input loading
use relay_shared::{Instruction, PrintJobError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<FileManagerError> for PrintJobError {
    fn from(e: FileManagerError) -> Self {
        match e {
            FileManagerError::NotFound(path) => PrintJobError::InputNotFound(path),
            FileManagerError::Io(msg) => PrintJobError::Input(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileManager {
    current_directory: PathBuf,
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileManager {
    /// Resolve relative job paths against the process working directory.
    pub fn new() -> Self {
        Self {
            current_directory: PathBuf::from("."),
        }
    }

    /// Resolve relative job paths against `dir`.
    pub fn with_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            current_directory: dir.into(),
        }
    }

    pub fn current_directory(&self) -> &Path {
        &self.current_directory
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.current_directory.join(path)
        }
    }

    /// Read a job file as text.
    pub async fn read_job_file(&self, path: &str) -> Result<String, FileManagerError> {
        let use_path = self.resolve(path);
        let shown = use_path.display().to_string();
        tracing::info!("Reading G-code file: {}", shown);
        match fs::read_to_string(&use_path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!("{} does not exist", shown);
                Err(FileManagerError::NotFound(shown))
            }
            Err(e) => Err(FileManagerError::Io(format!("{}: {}", shown, e))),
        }
    }

    /// Read a job file into instructions, one per line. Blank and
    /// comment-only lines are kept; they are skipped at send time.
    pub async fn load_job(&self, path: &str) -> Result<Vec<Instruction>, FileManagerError> {
        let content = self.read_job_file(path).await?;
        let instructions = Instruction::from_lines(&content);
        tracing::info!("Total lines: {}", instructions.len());
        Ok(instructions)
    }
}

// All test code lives in tests/file_manager.rs
