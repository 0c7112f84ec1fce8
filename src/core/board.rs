//! Board descriptors and the HAL catalog.
//!
//! The catalog is a JSON object mapping a board's display name to its
//! descriptor:
//!
//! ```json
//! {
//!   "ESP32": {
//!     "platform": "esp32:esp32:esp32",
//!     "core": "esp32:esp32",
//!     "source": "esp32.cpp",
//!     "board_manager_url": "https://espressif.github.io/arduino-esp32/package_esp32_index.json"
//!   }
//! }
//! ```
//!
//! Builds update `last_update` and `version` on the descriptor after a core
//! install or upgrade; the catalog is written back so the next build knows
//! what is already installed.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Target board description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardHal {
    /// Fully-qualified board name passed to the compiler (`vendor:arch:board`)
    pub platform: String,

    /// Core identifier (`vendor:arch`)
    pub core: String,

    /// HAL source file name inside the `hal/` directory
    pub source: String,

    /// Additional board manager index URL, if the core needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_manager_url: Option<String>,

    /// Extra compiler flags for this board, overriding the per-core defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_flags: Option<String>,

    /// When the core was last installed or upgraded
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    pub last_update: Option<DateTime<Utc>>,

    /// Installed core version recorded after the last core operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Fields used by other front ends, preserved on save
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl BoardHal {
    /// Create a descriptor with no bookkeeping.
    pub fn new(
        platform: impl Into<String>,
        core: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        BoardHal {
            platform: platform.into(),
            core: core.into(),
            source: source.into(),
            board_manager_url: None,
            extra_flags: None,
            last_update: None,
            version: None,
            extra: BTreeMap::new(),
        }
    }

    /// Set the board manager URL.
    pub fn with_board_manager_url(mut self, url: impl Into<String>) -> Self {
        self.board_manager_url = Some(url.into());
        self
    }

    /// The declared board manager URL, ignoring empty strings.
    pub fn board_manager_url(&self) -> Option<&str> {
        self.board_manager_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Record a successful core operation.
    pub fn record_core_update(&mut self, version: Option<String>) {
        self.last_update = Some(Utc::now());
        self.version = version;
    }

    /// Check the descriptor for obviously broken values.
    pub fn validate(&self) -> Result<()> {
        if self.platform.split(':').count() < 3 {
            bail!(
                "invalid platform `{}`: expected `vendor:arch:board`",
                self.platform
            );
        }
        if self.core.split(':').count() != 2 {
            bail!("invalid core `{}`: expected `vendor:arch`", self.core);
        }
        if self.source.trim().is_empty() {
            bail!("board for core `{}` has no HAL source file", self.core);
        }
        if let Some(url) = self.board_manager_url() {
            Url::parse(url).with_context(|| format!("invalid board manager URL `{}`", url))?;
        }
        Ok(())
    }
}

/// Accept RFC 3339 strings as well as the float epoch seconds older catalogs
/// stored.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(D::Error::custom),
        serde_json::Value::Number(n) => {
            let secs = n
                .as_f64()
                .ok_or_else(|| D::Error::custom("invalid timestamp"))?;
            let millis = (secs * 1000.0) as i64;
            Ok(DateTime::from_timestamp_millis(millis))
        }
        other => Err(D::Error::custom(format!("invalid timestamp: {}", other))),
    }
}

/// All known boards, keyed by display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HalCatalog {
    boards: BTreeMap<String, BoardHal>,
}

impl HalCatalog {
    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read board catalog: {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse board catalog: {}", path.display()))
    }

    /// Save the catalog, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;

        let contents =
            serde_json::to_string_pretty(self).context("failed to serialize board catalog")?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(contents.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(path)
            .with_context(|| format!("failed to write board catalog: {}", path.display()))?;

        Ok(())
    }

    /// Look up a board by display name.
    pub fn get(&self, name: &str) -> Option<&BoardHal> {
        self.boards.get(name)
    }

    /// Look up a board, failing with the list of known names.
    pub fn board(&self, name: &str) -> Result<&BoardHal> {
        match self.boards.get(name) {
            Some(board) => Ok(board),
            None => bail!(
                "unknown board `{}`\n\
                 available boards: {}",
                name,
                if self.boards.is_empty() {
                    "(none)".to_string()
                } else {
                    self.names().collect::<Vec<_>>().join(", ")
                }
            ),
        }
    }

    /// Mutable lookup, used to record core updates after a build.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut BoardHal> {
        self.boards.get_mut(name)
    }

    /// Add or replace a board.
    pub fn insert(&mut self, name: impl Into<String>, board: BoardHal) {
        self.boards.insert(name.into(), board);
    }

    /// Board names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.boards.keys().map(String::as_str)
    }

    /// Iterate over all boards.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoardHal)> {
        self.boards.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of boards.
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}
