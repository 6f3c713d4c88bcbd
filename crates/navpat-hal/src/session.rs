//! Session log: one TOML meta file naming the labelled logs of a run.
//!
//! ```text
//! logs/
//!   meta_260418_101502.toml          ← SessionMeta (this is what `replay` takes)
//!   navpat_260418_101502_can.jsonl   ← LogRecord stream
//!   navpat_260418_101502_timestamps.log
//! ```
//!
//! Log paths in the meta file are relative to the meta file's directory so
//! a session can be moved or archived as a whole.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use navpat_types::NavError;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Contents of the meta file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: Uuid,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Raw configuration text the run was started with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    /// Log label → file name.
    #[serde(default)]
    pub logs: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SessionLog {
    meta_path: PathBuf,
    meta: SessionMeta,
}

impl SessionLog {
    /// Label of the command/telemetry record log.
    pub const CAN: &'static str = "can";
    /// Label of the wall-clock correlation log.
    pub const TIMESTAMPS: &'static str = "timestamps";

    /// Create a new session in `dir` and write its meta file.
    ///
    /// The log files themselves are created by whoever writes them.
    pub fn create(
        dir: impl AsRef<Path>,
        note: Option<String>,
        config: Option<String>,
    ) -> Result<Self, NavError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| NavError::SessionLog(format!("{}: {e}", dir.display())))?;

        let base = Local::now().format("%y%m%d_%H%M%S").to_string();
        let mut stamp = base.clone();
        let mut n = 1;
        while dir.join(format!("meta_{stamp}.toml")).exists() {
            n += 1;
            stamp = format!("{base}_{n}");
        }

        let stem = format!("navpat_{stamp}");
        let logs = [Self::CAN, Self::TIMESTAMPS]
            .into_iter()
            .map(|label| {
                let ext = if label == Self::CAN { "jsonl" } else { "log" };
                (label.to_string(), format!("{stem}_{label}.{ext}"))
            })
            .collect();

        let session = Self {
            meta_path: dir.join(format!("meta_{stamp}.toml")),
            meta: SessionMeta {
                session_id: Uuid::new_v4(),
                created: Utc::now(),
                note,
                config,
                logs,
            },
        };

        let text = toml::to_string(&session.meta)
            .map_err(|e| NavError::SessionLog(format!("encode meta: {e}")))?;
        fs::write(&session.meta_path, text)
            .map_err(|e| NavError::SessionLog(format!("{}: {e}", session.meta_path.display())))?;
        info!(
            meta = %session.meta_path.display(),
            session_id = %session.meta.session_id,
            "session log created"
        );
        Ok(session)
    }

    /// Open an existing session from its meta file.
    pub fn open(meta_path: impl AsRef<Path>) -> Result<Self, NavError> {
        let meta_path = meta_path.as_ref();
        let text = fs::read_to_string(meta_path)
            .map_err(|e| NavError::SessionLog(format!("{}: {e}", meta_path.display())))?;
        let meta: SessionMeta = toml::from_str(&text)
            .map_err(|e| NavError::SessionLog(format!("{}: {e}", meta_path.display())))?;
        Ok(Self {
            meta_path: meta_path.to_path_buf(),
            meta,
        })
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    /// Full path of the log labelled `label`.
    pub fn log_path(&self, label: &str) -> Result<PathBuf, NavError> {
        let file = self.meta.logs.get(label).ok_or_else(|| {
            NavError::SessionLog(format!(
                "{}: no '{label}' log in session",
                self.meta_path.display()
            ))
        })?;
        let dir = self.meta_path.parent().unwrap_or_else(|| Path::new("."));
        Ok(dir.join(file))
    }
}
