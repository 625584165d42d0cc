//! Command line configuration and resolved project paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

/// Default port, probed upward when busy.
pub const DEFAULT_PORT: u16 = 3737;

/// Number of consecutive ports tried before giving up.
pub const PORT_ATTEMPTS: u16 = 10;

#[derive(Parser, Debug, Clone)]
#[command(name = "taskview")]
#[command(about = "Live viewer for a Task Master project")]
pub struct ServerArgs {
    /// Project directory containing `.taskmaster/`
    #[arg(long, env = "TM_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    /// Port to listen on (the next free port is used when busy)
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,

    /// Directory with the browser UI assets
    #[arg(long, env = "TASKVIEW_PUBLIC_DIR")]
    pub public_dir: Option<PathBuf>,

    /// Quiet period before a change is announced, in milliseconds
    #[arg(long, default_value_t = 300)]
    pub debounce_ms: u64,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Resolved, validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub project_dir: PathBuf,
    pub bind: String,
    pub port: u16,
    pub public_dir: Option<PathBuf>,
    pub debounce: Duration,
}

impl ServerConfig {
    /// Resolve paths against the working directory and check the project layout.
    pub fn from_args(args: ServerArgs) -> Result<Self> {
        let project_dir = match args.project_dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let config = Self {
            project_dir,
            bind: args.bind,
            port: args.port,
            public_dir: args.public_dir,
            debounce: Duration::from_millis(args.debounce_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a project directory with default settings.
    pub fn for_project(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            public_dir: None,
            debounce: Duration::from_millis(300),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let taskmaster = self.taskmaster_dir();
        if !taskmaster.is_dir() {
            bail!(
                "No .taskmaster directory found in {}. Run this from a Task Master project.",
                self.project_dir.display()
            );
        }
        if let Some(public_dir) = &self.public_dir {
            if !public_dir.is_dir() {
                bail!("Public directory not found: {}", public_dir.display());
            }
        }
        Ok(())
    }

    pub fn taskmaster_dir(&self) -> PathBuf {
        self.project_dir.join(".taskmaster")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.taskmaster_dir().join("tasks")
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.tasks_dir().join("tasks.json")
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.taskmaster_dir().join("docs")
    }

    pub fn config_file(&self) -> PathBuf {
        self.taskmaster_dir().join("config.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.taskmaster_dir().join("state.json")
    }

    /// Name shown for the project: the directory's last component.
    pub fn project_name(&self) -> String {
        project_name(&self.project_dir)
    }
}

fn project_name(dir: &Path) -> String {
    let resolved = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| resolved.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_taskmaster_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = ServerConfig::for_project(dir.path()).validate().unwrap_err();
        assert!(err.to_string().contains("No .taskmaster directory"));
    }

    #[test]
    fn test_paths_resolve_under_taskmaster() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".taskmaster")).unwrap();

        let config = ServerConfig::from_args(ServerArgs {
            project_dir: Some(dir.path().to_path_buf()),
            port: 4000,
            bind: "127.0.0.1".to_string(),
            public_dir: None,
            debounce_ms: 50,
            verbose: false,
        })
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert!(config.tasks_file().ends_with(".taskmaster/tasks/tasks.json"));
        assert!(config.docs_dir().ends_with(".taskmaster/docs"));
        assert_eq!(
            config.project_name(),
            dir.path().canonicalize().unwrap().file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn test_args_defaults() {
        let args = ServerArgs::parse_from(["taskview", "--project-dir", "/tmp/x"]);
        assert_eq!(args.bind, "127.0.0.1");
        assert_eq!(args.debounce_ms, 300);
        assert!(!args.verbose);
    }
}
