//! Storage facade routing keys to the secure or general store.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use vitals_types::VitalsReading;

use crate::error::{Error, Result};
use crate::models::{AppSettings, ConnectionRecord, OnboardingStatus, UserPreferences, WifiConfig};
use crate::store::KvStore;

/// Keys with this prefix are kept in the secure store.
pub const SENSITIVE_PREFIX: &str = "sensitive_";

/// Namespace applied to every key in the general store.
pub const APP_PREFIX: &str = "@vitals:";

/// Maximum number of entries kept in `device_connection_history`.
pub const MAX_CONNECTION_HISTORY: usize = 50;

/// Maximum number of readings kept in the upload queue.
pub const MAX_PENDING_SYNC: usize = 10_000;

/// Readings read from the upload queue, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    pub readings: Vec<VitalsReading>,
    through: Option<i64>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }
}

/// Well-known keys.
pub mod keys {
    pub const DEVICE_CONNECTION_HISTORY: &str = "device_connection_history";
    pub const USER_PREFERENCES: &str = "user_preferences";
    pub const APP_SETTINGS: &str = "app_settings";
    pub const ONBOARDING_STATUS: &str = "onboarding_status";
    pub const AUTH_TOKEN: &str = "sensitive_auth_token";

    /// Key holding the WiFi configuration of one device.
    pub fn wifi_config(device_id: &str) -> String {
        format!("wifi_config_{device_id}")
    }
}

/// Key/value persistence split into a secure and a general store.
///
/// Values are stored as JSON text. Keys starting with [`SENSITIVE_PREFIX`]
/// live in a separate database readable only by the owner; all other keys
/// are namespaced with [`APP_PREFIX`] in the general database.
pub struct StorageFacade {
    general: KvStore,
    secure: KvStore,
    // Serializes read-modify-write helpers.
    update_lock: Mutex<()>,
}

impl std::fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFacade").finish_non_exhaustive()
    }
}

impl StorageFacade {
    /// Open (or create) both stores inside `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| Error::CreateDirectory {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let secure_path = dir.join("secure.db");
        restrict_permissions(&secure_path)?;

        let facade = Self {
            general: KvStore::open(dir.join("general.db"))?,
            secure: KvStore::open(&secure_path)?,
            update_lock: Mutex::new(()),
        };
        info!("Storage ready in {}", dir.display());
        Ok(facade)
    }

    /// Open the stores in the platform data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_storage_dir())
    }

    /// Open in-memory stores (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            general: KvStore::open_in_memory()?,
            secure: KvStore::open_in_memory()?,
            update_lock: Mutex::new(()),
        })
    }

    /// Returns true if `key` is routed to the secure store.
    pub fn is_sensitive(key: &str) -> bool {
        key.starts_with(SENSITIVE_PREFIX)
    }

    fn route(&self, key: &str) -> (&KvStore, String) {
        if Self::is_sensitive(key) {
            (&self.secure, key.to_string())
        } else {
            (&self.general, format!("{APP_PREFIX}{key}"))
        }
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.set_text(key, &text)
    }

    /// Store `text` under `key` without serializing it.
    pub fn set_text(&self, key: &str, text: &str) -> Result<()> {
        let (store, physical) = self.route(key);
        store.set(&physical, text)
    }

    /// Fetch the value under `key`.
    ///
    /// A stored value that is not valid JSON is returned verbatim as
    /// [`Value::String`].
    pub fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let (store, physical) = self.route(key);
        let Some(raw) = store.get(&physical)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!("Value under {} is not JSON ({}), returning text", key, e);
                Ok(Some(Value::String(raw)))
            }
        }
    }

    /// Fetch and deserialize the value under `key`.
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let (store, physical) = self.route(key);
        match store.get(&physical)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Delete `key`. Returns true if it existed.
    pub fn remove_item(&self, key: &str) -> Result<bool> {
        let (store, physical) = self.route(key);
        store.remove(&physical)
    }

    /// All logical keys across both stores.
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .general
            .keys_with_prefix(APP_PREFIX)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(APP_PREFIX).map(str::to_string))
            .collect();
        keys.extend(self.secure.keys_with_prefix(SENSITIVE_PREFIX)?);
        keys.sort();
        Ok(keys)
    }

    /// Delete every key in both stores.
    pub fn clear(&self) -> Result<()> {
        let general = self.general.clear_prefix(APP_PREFIX)?;
        let secure = self.secure.clear_prefix(SENSITIVE_PREFIX)?;
        let queued = self.general.queue_clear()?;
        info!(
            "Cleared {} general and {} secure entries, {} queued readings",
            general, secure, queued
        );
        Ok(())
    }

    fn update<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T),
    {
        let _guard = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut value = self.get_typed::<T>(key)?.unwrap_or_default();
        f(&mut value);
        self.set_item(key, &value)?;
        Ok(value)
    }

    // === pending_sync ===

    /// Append readings to the upload queue. Returns the new queue length.
    ///
    /// Each reading is one row, so appends cost the same however long the
    /// queue is. Past [`MAX_PENDING_SYNC`] the oldest readings are dropped.
    pub fn queue_pending_sync(&self, readings: &[VitalsReading]) -> Result<usize> {
        let rows = readings
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let (len, dropped) = self.general.queue_push(&rows, MAX_PENDING_SYNC)?;
        if dropped > 0 {
            warn!("Upload queue full, dropped {} oldest readings", dropped);
        }
        debug!("Pending sync queue holds {} readings", len);
        Ok(len)
    }

    /// Readings waiting for upload, oldest first.
    pub fn pending_sync(&self) -> Result<Vec<VitalsReading>> {
        Ok(self.peek_pending_sync()?.readings)
    }

    pub fn pending_sync_len(&self) -> Result<usize> {
        self.general.queue_len()
    }

    /// Snapshot of the queue. Nothing is removed until the batch is
    /// passed to [`StorageFacade::ack_pending_sync`].
    pub fn peek_pending_sync(&self) -> Result<PendingBatch> {
        let rows = self.general.queue_peek()?;
        let through = rows.last().map(|(id, _)| *id);
        let mut readings = Vec::with_capacity(rows.len());
        for (id, text) in rows {
            match serde_json::from_str(&text) {
                Ok(reading) => readings.push(reading),
                Err(e) => warn!("Skipping unreadable queued reading {}: {}", id, e),
            }
        }
        Ok(PendingBatch { readings, through })
    }

    /// Remove the readings of `batch` from the queue. Readings queued after
    /// the batch was taken stay put.
    pub fn ack_pending_sync(&self, batch: &PendingBatch) -> Result<usize> {
        match batch.through {
            Some(through) => self.general.queue_ack(through),
            None => Ok(0),
        }
    }

    // === device_connection_history ===

    /// Record a connection, newest first, keeping at most
    /// [`MAX_CONNECTION_HISTORY`] entries.
    pub fn record_connection(&self, record: ConnectionRecord) -> Result<()> {
        self.update(
            keys::DEVICE_CONNECTION_HISTORY,
            |history: &mut Vec<ConnectionRecord>| {
                history.insert(0, record);
                history.truncate(MAX_CONNECTION_HISTORY);
            },
        )?;
        Ok(())
    }

    /// Past connections, newest first.
    pub fn connection_history(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(self
            .get_typed(keys::DEVICE_CONNECTION_HISTORY)?
            .unwrap_or_default())
    }

    // === settings ===

    pub fn user_preferences(&self) -> Result<UserPreferences> {
        Ok(self.get_typed(keys::USER_PREFERENCES)?.unwrap_or_default())
    }

    pub fn set_user_preferences(&self, prefs: &UserPreferences) -> Result<()> {
        self.set_item(keys::USER_PREFERENCES, prefs)
    }

    pub fn app_settings(&self) -> Result<AppSettings> {
        Ok(self.get_typed(keys::APP_SETTINGS)?.unwrap_or_default())
    }

    pub fn set_app_settings(&self, settings: &AppSettings) -> Result<()> {
        self.set_item(keys::APP_SETTINGS, settings)
    }

    pub fn onboarding_status(&self) -> Result<OnboardingStatus> {
        Ok(self.get_typed(keys::ONBOARDING_STATUS)?.unwrap_or_default())
    }

    pub fn set_onboarding_status(&self, status: &OnboardingStatus) -> Result<()> {
        self.set_item(keys::ONBOARDING_STATUS, status)
    }

    // === per-device ===

    pub fn wifi_config(&self, device_id: &str) -> Result<Option<WifiConfig>> {
        self.get_typed(&keys::wifi_config(device_id))
    }

    pub fn set_wifi_config(&self, device_id: &str, config: &WifiConfig) -> Result<()> {
        self.set_item(&keys::wifi_config(device_id), config)
    }

    pub fn remove_wifi_config(&self, device_id: &str) -> Result<bool> {
        self.remove_item(&keys::wifi_config(device_id))
    }

    // === secrets ===

    /// API bearer token, kept in the secure store.
    pub fn auth_token(&self) -> Result<Option<String>> {
        self.get_typed(keys::AUTH_TOKEN)
    }

    pub fn set_auth_token(&self, token: &str) -> Result<()> {
        self.set_item(keys::AUTH_TOKEN, token)
    }

    pub fn clear_auth_token(&self) -> Result<bool> {
        self.remove_item(keys::AUTH_TOKEN)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::fs::{OpenOptions, Permissions};
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let secure = |e| Error::SecurePermissions {
        path: path.to_path_buf(),
        source: e,
    };
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .map_err(secure)?;
    std::fs::set_permissions(path, Permissions::from_mode(0o600)).map_err(secure)
}

#[cfg(not(unix))]
fn restrict_permissions(path: &Path) -> Result<()> {
    tracing::warn!(
        "Owner-only permissions are not enforced for {} on this platform",
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn reading(bpm: u16) -> VitalsReading {
        VitalsReading::builder("dev")
            .heart_rate(bpm)
            .captured_at(OffsetDateTime::UNIX_EPOCH)
            .build()
    }

    #[test]
    fn test_sensitive_keys_are_routed_to_secure_store() {
        let storage = StorageFacade::open_in_memory().unwrap();
        storage.set_auth_token("secret").unwrap();
        storage.set_item("theme", "dark").unwrap();

        assert_eq!(
            storage.secure.get("sensitive_auth_token").unwrap().as_deref(),
            Some("\"secret\"")
        );
        assert!(storage.general.get("@vitals:sensitive_auth_token").unwrap().is_none());
        assert_eq!(
            storage.general.get("@vitals:theme").unwrap().as_deref(),
            Some("\"dark\"")
        );
        assert_eq!(storage.auth_token().unwrap().as_deref(), Some("secret"));
    }

    #[test]
    fn test_unparseable_value_returned_verbatim() {
        let storage = StorageFacade::open_in_memory().unwrap();
        storage.set_text("legacy", "not json {").unwrap();
        assert_eq!(
            storage.get_item("legacy").unwrap(),
            Some(Value::String("not json {".to_string()))
        );
    }

    #[test]
    fn test_get_item_parses_json() {
        let storage = StorageFacade::open_in_memory().unwrap();
        storage.set_item("count", &3).unwrap();
        assert_eq!(storage.get_item("count").unwrap(), Some(Value::from(3)));
        assert_eq!(storage.get_item("missing").unwrap(), None);
    }

    #[test]
    fn test_keys_and_clear() {
        let storage = StorageFacade::open_in_memory().unwrap();
        storage.set_item("b", &1).unwrap();
        storage.set_item("a", &2).unwrap();
        storage.set_auth_token("t").unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["a", "b", "sensitive_auth_token"]);

        storage.clear().unwrap();
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_pending_sync_queue() {
        let storage = StorageFacade::open_in_memory().unwrap();
        assert_eq!(storage.queue_pending_sync(&[reading(70)]).unwrap(), 1);
        assert_eq!(
            storage
                .queue_pending_sync(&[reading(71), reading(72)])
                .unwrap(),
            3
        );

        let batch = storage.peek_pending_sync().unwrap();
        let bpm: Vec<_> = batch.readings.iter().filter_map(|r| r.heart_rate).collect();
        assert_eq!(bpm, vec![70, 71, 72]);

        // Queued while the batch was in flight
        storage.queue_pending_sync(&[reading(73)]).unwrap();
        assert_eq!(storage.ack_pending_sync(&batch).unwrap(), 3);
        assert_eq!(storage.pending_sync().unwrap(), vec![reading(73)]);
    }

    #[test]
    fn test_pending_sync_is_capped() {
        let storage = StorageFacade::open_in_memory().unwrap();
        let first: Vec<_> = (0..MAX_PENDING_SYNC as u16).map(reading).collect();
        assert_eq!(storage.queue_pending_sync(&first).unwrap(), MAX_PENDING_SYNC);

        assert_eq!(
            storage
                .queue_pending_sync(&[reading(60_000), reading(60_001)])
                .unwrap(),
            MAX_PENDING_SYNC
        );
        let queued = storage.pending_sync().unwrap();
        assert_eq!(queued.len(), MAX_PENDING_SYNC);
        assert_eq!(queued[0].heart_rate, Some(2));
        assert_eq!(queued.last().unwrap().heart_rate, Some(60_001));
    }

    #[test]
    fn test_clear_empties_queue() {
        let storage = StorageFacade::open_in_memory().unwrap();
        storage.queue_pending_sync(&[reading(70)]).unwrap();
        storage.clear().unwrap();
        assert_eq!(storage.pending_sync_len().unwrap(), 0);
    }

    #[test]
    fn test_connection_history_bounded_newest_first() {
        let storage = StorageFacade::open_in_memory().unwrap();
        for i in 0..(MAX_CONNECTION_HISTORY + 5) {
            storage
                .record_connection(ConnectionRecord {
                    device_id: format!("dev-{i}"),
                    device_name: None,
                    connected_at: OffsetDateTime::UNIX_EPOCH,
                })
                .unwrap();
        }

        let history = storage.connection_history().unwrap();
        assert_eq!(history.len(), MAX_CONNECTION_HISTORY);
        assert_eq!(history[0].device_id, format!("dev-{}", MAX_CONNECTION_HISTORY + 4));
    }

    #[test]
    fn test_settings_default_when_missing() {
        let storage = StorageFacade::open_in_memory().unwrap();
        assert_eq!(storage.app_settings().unwrap(), AppSettings::default());

        let settings = AppSettings {
            scan_timeout_secs: 30,
            ..Default::default()
        };
        storage.set_app_settings(&settings).unwrap();
        assert_eq!(storage.app_settings().unwrap().scan_timeout_secs, 30);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_on_disk_restricts_secure_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        {
            let storage = StorageFacade::open(dir.path()).unwrap();
            storage.set_auth_token("secret").unwrap();
            storage.set_item("theme", "dark").unwrap();
        }

        let mode = std::fs::metadata(dir.path().join("secure.db"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);

        let reopened = StorageFacade::open(dir.path()).unwrap();
        assert_eq!(reopened.auth_token().unwrap().as_deref(), Some("secret"));
        assert_eq!(reopened.get_typed::<String>("theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_wifi_config_per_device() {
        let storage = StorageFacade::open_in_memory().unwrap();
        let config = WifiConfig {
            ssid: "home".to_string(),
            security: "WPA2".to_string(),
            configured_at: OffsetDateTime::UNIX_EPOCH,
        };
        storage.set_wifi_config("dev-1", &config).unwrap();

        assert_eq!(storage.wifi_config("dev-1").unwrap(), Some(config));
        assert_eq!(storage.wifi_config("dev-2").unwrap(), None);
        assert!(storage.keys().unwrap().contains(&"wifi_config_dev-1".to_string()));
        assert!(storage.remove_wifi_config("dev-1").unwrap());
    }
}
