//! Process configuration, read from the environment (after `.env` is loaded).
//!
//! | variable                | default              |
//! |-------------------------|----------------------|
//! | `ECOSCAN_STORE`         | `sqlite` (`memory` without the feature) |
//! | `ECOSCAN_DB_PATH`       | `data/ecoscan.db`    |
//! | `ECOSCAN_TAXONOMY`      | `extended`           |
//! | `ECOSCAN_TAXONOMY_PATH` | `config/taxonomy.toml` when present |
//! | `DEBUG_ROUTES`          | off                  |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::ledger::{ActionLedger, ActionStore, InMemoryStore};
use crate::taxonomy::{load_taxonomy_default, Taxonomy};

pub const ENV_STORE: &str = "ECOSCAN_STORE";
pub const ENV_DB_PATH: &str = "ECOSCAN_DB_PATH";
pub const ENV_DEBUG_ROUTES: &str = "DEBUG_ROUTES";
pub const DEFAULT_DB_PATH: &str = "data/ecoscan.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(anyhow!("unknown {ENV_STORE} value {other:?} (expected memory|sqlite)")),
        }
    }
}

impl Default for StoreKind {
    fn default() -> Self {
        if cfg!(feature = "sqlite") {
            Self::Sqlite
        } else {
            Self::Memory
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreKind,
    pub db_path: PathBuf,
    pub debug_routes: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            debug_routes: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match std::env::var(ENV_STORE) {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ => StoreKind::default(),
        };
        let db_path = std::env::var(ENV_DB_PATH)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        Ok(Self {
            store,
            db_path,
            debug_routes: env_flag(ENV_DEBUG_ROUTES),
        })
    }

    /// Taxonomy per `$ECOSCAN_TAXONOMY_PATH` / `config/taxonomy.toml` / preset.
    pub fn load_taxonomy(&self) -> anyhow::Result<Arc<Taxonomy>> {
        Ok(Arc::new(load_taxonomy_default()?))
    }

    pub fn open_store(&self) -> anyhow::Result<Arc<dyn ActionStore>> {
        match self.store {
            StoreKind::Memory => Ok(Arc::new(InMemoryStore::new())),
            #[cfg(feature = "sqlite")]
            StoreKind::Sqlite => {
                let store = crate::ledger::SqliteStore::open(&self.db_path)
                    .with_context(|| format!("opening ledger at {}", self.db_path.display()))?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "sqlite"))]
            StoreKind::Sqlite => Err(anyhow!("{ENV_STORE}=sqlite but the `sqlite` feature is off")),
        }
    }

    pub fn open_ledger(&self) -> anyhow::Result<ActionLedger> {
        Ok(ActionLedger::new(self.open_store()?))
    }
}
