use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::timezone::{is_valid_zone, DEFAULT_ZONE};
use crate::units::NetworkUnit;

pub const UNIT_KEY: &str = "network_unit";
pub const ZONE_KEY: &str = "history_timezone";

/// Durable key-value storage for user preferences.
pub trait PreferenceStore {
    fn get(&self, key: &str, default: &str) -> String;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.values.get(key).cloned().unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Preferences persisted as a flat JSON object on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    /// A missing file is an empty store. So is a file that does not hold a
    /// JSON object of strings; it is replaced on the next `set`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read(&path) {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(values) => values,
                Err(err) => {
                    warn!(path = %path.display(), ?err, "ignoring unreadable preference file");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> std::io::Result<()> {
        let body = serde_json::to_vec_pretty(&self.values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.values.get(key).cloned().unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush().map_err(|err| Error::Preference {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }
}

/// Process-wide display settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DisplayPreference {
    pub network_unit: NetworkUnit,
    pub timezone: String,
}

impl Default for DisplayPreference {
    fn default() -> Self {
        Self { network_unit: NetworkUnit::default(), timezone: DEFAULT_ZONE.to_string() }
    }
}

impl DisplayPreference {
    /// Read both settings, replacing absent or invalid values by the defaults.
    pub fn load<S: PreferenceStore + ?Sized>(store: &S) -> Self {
        let defaults = Self::default();

        let raw_unit = store.get(UNIT_KEY, defaults.network_unit.as_str());
        let network_unit = raw_unit.parse::<NetworkUnit>().unwrap_or_else(|err| {
            warn!(%err, "stored network unit is invalid, using default");
            defaults.network_unit
        });

        let raw_zone = store.get(ZONE_KEY, &defaults.timezone);
        let timezone = if is_valid_zone(&raw_zone) {
            raw_zone
        } else {
            warn!(zone = %raw_zone, "stored timezone is invalid, using default");
            defaults.timezone
        };

        debug!(%network_unit, %timezone, "loaded display preferences");
        Self { network_unit, timezone }
    }

    pub fn set_unit<S: PreferenceStore + ?Sized>(
        &mut self,
        store: &mut S,
        unit: NetworkUnit,
    ) -> Result<()> {
        store.set(UNIT_KEY, unit.as_str())?;
        self.network_unit = unit;
        Ok(())
    }

    /// Rejects identifiers that do not resolve; nothing is stored then.
    pub fn set_timezone<S: PreferenceStore + ?Sized>(
        &mut self,
        store: &mut S,
        zone: &str,
    ) -> Result<()> {
        if !is_valid_zone(zone) {
            return Err(Error::Preference {
                key: ZONE_KEY.to_string(),
                reason: format!("unknown timezone `{zone}`"),
            });
        }
        store.set(ZONE_KEY, zone)?;
        self.timezone = zone.to_string();
        Ok(())
    }
}
