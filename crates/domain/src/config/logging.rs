use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the server writes its log file. `GET /logs` tails the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "d_dir")]
    pub dir: PathBuf,
    #[serde(default = "d_file")]
    pub file: String,
    /// JSON lines on stdout when true, compact human-readable otherwise.
    #[serde(default = "d_true")]
    pub json: bool,
}

impl LoggingConfig {
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: d_dir(),
            file: d_file(),
            json: true,
        }
    }
}

fn d_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn d_file() -> String {
    "app.log".into()
}
fn d_true() -> bool {
    true
}
