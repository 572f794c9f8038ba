//! Session cookie store: one JSON file holding every site's browser
//! cookies, keyed by site.
//!
//! Saving one site's cookies re-reads the file and replaces only that
//! site's entry. Other sites' entries are carried as raw JSON, so a record
//! this crate cannot parse still survives the rewrite.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::errors::AppError;

/// A browser cookie as the automation driver reports it. Fields the store
/// does not know about are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Seconds since the epoch. Some drivers report fractional values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expiry: None,
            extra: Map::new(),
        }
    }
}

/// Site key to that site's cookie list, kept as raw JSON.
type CookieFile = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct CookieStore {
    path: PathBuf,
}

impl CookieStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cookies saved for `site`; empty when the file or the entry is missing.
    /// A file that is not a JSON object is an error. An entry that does not
    /// parse as a cookie list is logged and read as empty.
    pub fn load(&self, site: &str) -> Result<Vec<Cookie>, AppError> {
        let Some(entry) = self.read_all()?.remove(site) else {
            debug!("No saved cookies for {site}");
            return Ok(Vec::new());
        };
        match serde_json::from_value::<Vec<Cookie>>(entry) {
            Ok(cookies) => {
                debug!("Loaded {} cookies for {site}", cookies.len());
                Ok(cookies)
            }
            Err(e) => {
                warn!("Saved cookies for {site} are malformed ({e}); ignoring them");
                Ok(Vec::new())
            }
        }
    }

    /// Replaces `site`'s cookies, leaving every other site's entry intact.
    ///
    /// When the existing file cannot be parsed at all it is moved aside to
    /// `<file>.bak` before a fresh store is written.
    pub fn save(&self, site: &str, cookies: &[Cookie]) -> Result<(), AppError> {
        let mut all = match self.read_all() {
            Ok(all) => all,
            Err(AppError::Io(e)) => return Err(AppError::Io(e)),
            Err(e) => {
                let backup = self.backup_path();
                std::fs::rename(&self.path, &backup)?;
                warn!(
                    "Cookie file {} is unreadable ({e}); moved it to {}",
                    self.path.display(),
                    backup.display()
                );
                CookieFile::new()
            }
        };
        all.insert(site.to_string(), serde_json::to_value(cookies)?);
        self.write_all(&all)?;
        info!("Saved {} cookies for {site}", cookies.len());
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    fn read_all(&self) -> Result<CookieFile, AppError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CookieFile::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(CookieFile::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(all) => Ok(all),
            other => Err(AppError::Config(format!(
                "cookie file {} holds {} instead of an object",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    /// Writes through a temp file in the same directory and renames it over
    /// the target, so a crash never leaves a half-written store.
    fn write_all(&self, all: &CookieFile) -> Result<(), AppError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(all)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
