use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    pub storage: Storage,
    pub inventory: Inventory,
    pub resolver: Resolver,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// In-process reader/writer lock only.
    #[default]
    Process,
    /// In-process lock plus an advisory file lock for writers, for several
    /// instances sharing one store file.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    /// Path of the persisted group store. Default: data/groups.json
    pub path: PathBuf,
    #[serde(default)]
    pub lock: LockBackend,
    /// Lock file used by the `file` backend. Defaults to `<path>.lock`
    pub lock_path: Option<PathBuf>,
}

impl Storage {
    pub fn lock_file(&self) -> PathBuf {
        self.lock_path
            .clone()
            .unwrap_or_else(|| self.path.with_extension("lock"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    /// JSON inventory document (location tree and hosting links). Default: data/inventory.json
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolver {
    /// Internal name of the controller asset that never appears in resolved groups
    pub reserved_asset: Option<String>,
    /// Maximum chain of group-to-group references followed during one resolution
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    10
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/groups.json"),
            lock: LockBackend::Process,
            lock_path: None,
        }
    }
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/inventory.json"),
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            reserved_asset: Some("rackcontroller-0".to_string()),
            max_depth: default_max_depth(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)
            .into_diagnostic()?
            .set_default("server.port", Server::default().port)
            .into_diagnostic()?
            .set_default(
                "storage.path",
                Storage::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default("storage.lock", "process")
            .into_diagnostic()?
            .set_default(
                "inventory.path",
                Inventory::default().path.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default("resolver.reserved_asset", "rackcontroller-0")
            .into_diagnostic()?
            .set_default("resolver.max_depth", default_max_depth() as i64)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: AUTOGROUP__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("AUTOGROUP").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize file paths to be relative to current dir
        let cwd = std::env::current_dir().into_diagnostic()?;
        if s.storage.path.is_relative() {
            s.storage.path = cwd.join(&s.storage.path);
        }
        if let Some(lock_path) = &s.storage.lock_path {
            if lock_path.is_relative() {
                s.storage.lock_path = Some(cwd.join(lock_path));
            }
        }
        if s.inventory.path.is_relative() {
            s.inventory.path = cwd.join(&s.inventory.path);
        }

        Ok(s)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
