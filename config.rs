//! Constructor options (spec §6.2).

use std::num::NonZeroU32;
use std::path::PathBuf;

/// Token-bucket configuration for the concurrent-read rate limiter (spec §4.H, §5).
#[derive(Debug, Clone, Copy)]
pub struct ReadRateLimit {
    pub per_second: NonZeroU32,
    pub burst: NonZeroU32,
}

impl Default for ReadRateLimit {
    fn default() -> Self {
        ReadRateLimit {
            per_second: NonZeroU32::new(100).unwrap(),
            burst: NonZeroU32::new(100).unwrap(),
        }
    }
}

/// Constructor options for [`crate::Store::open`] (spec §6.2's configuration table).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub(crate) directory: Option<PathBuf>,
    pub(crate) filename: String,
    pub(crate) password: Option<String>,
    pub(crate) rebuild_cache: bool,
    pub(crate) require_type_registration: bool,
    pub(crate) read_rate_limit: ReadRateLimit,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            directory: None,
            filename: "tycho_cache.db".to_string(),
            password: None,
            rebuild_cache: false,
            require_type_registration: false,
            read_rate_limit: ReadRateLimit::default(),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the database file. Defaults to the system temp directory.
    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Opens an encrypted database using the given key. The key is passed to SQLite's
    /// `PRAGMA key` at connection open; the key-derivation scheme itself is the linked SQLite
    /// build's concern, not this crate's (spec §1: encryption keying is out of scope).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn rebuild_cache(mut self, rebuild_cache: bool) -> Self {
        self.rebuild_cache = rebuild_cache;
        self
    }

    #[must_use]
    pub fn require_type_registration(mut self, require: bool) -> Self {
        self.require_type_registration = require;
        self
    }

    #[must_use]
    pub fn read_rate_limit(mut self, limit: ReadRateLimit) -> Self {
        self.read_rate_limit = limit;
        self
    }

    /// Resolves the on-disk path of the database file.
    pub(crate) fn resolve_path(&self) -> PathBuf {
        let dir = self.directory.clone().unwrap_or_else(std::env::temp_dir);
        dir.join(&self.filename)
    }
}
