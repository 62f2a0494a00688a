//! Bluetooth permission gate.
//!
//! # Platform Differences
//!
//! | Platform | Model | Required before scanning |
//! |----------|-------|--------------------------|
//! | Linux (BlueZ) | none | nothing |
//! | macOS (CoreBluetooth) | system prompt on first use | nothing the app can query |
//! | Windows (WinRT) | none | nothing |
//! | Android | granular runtime permissions | `BLUETOOTH_SCAN`, `BLUETOOTH_CONNECT`, `ACCESS_FINE_LOCATION`, `ACCESS_COARSE_LOCATION` |
//!
//! On desktop platforms [`NoPermissionModel`] grants everything. Hosts with a
//! granular model wrap their platform API in a [`PermissionBackend`] and hand
//! it to [`GranularPermissionGate`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::{PermissionGate, PermissionStatus};

/// Permissions required on platforms with a granular model.
pub const REQUIRED_PERMISSIONS: [&str; 4] = [
    "BLUETOOTH_SCAN",
    "BLUETOOTH_CONNECT",
    "ACCESS_FINE_LOCATION",
    "ACCESS_COARSE_LOCATION",
];

/// Platform identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS with CoreBluetooth
    MacOS,
    /// Linux with BlueZ
    Linux,
    /// Windows with WinRT
    Windows,
    /// Android runtime permissions
    Android,
    /// Unknown or unsupported platform
    Unknown,
}

impl Platform {
    /// Detect the current platform.
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        {
            Platform::MacOS
        }
        #[cfg(target_os = "android")]
        {
            Platform::Android
        }
        #[cfg(target_os = "linux")]
        {
            Platform::Linux
        }
        #[cfg(target_os = "windows")]
        {
            Platform::Windows
        }
        #[cfg(not(any(
            target_os = "macos",
            target_os = "android",
            target_os = "linux",
            target_os = "windows"
        )))]
        {
            Platform::Unknown
        }
    }

    /// Returns true if scanning requires runtime permission grants.
    pub fn has_granular_permissions(self) -> bool {
        matches!(self, Platform::Android)
    }
}

/// Gate for platforms that have nothing to grant.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPermissionModel;

#[async_trait]
impl PermissionGate for NoPermissionModel {
    async fn check_all_permissions(&self) -> PermissionStatus {
        PermissionStatus::granted()
    }

    async fn request_all_permissions(&self) -> PermissionStatus {
        PermissionStatus::granted()
    }
}

/// Host hook onto a granular runtime-permission API.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Whether `permission` is currently granted.
    async fn is_granted(&self, permission: &str) -> Result<bool>;

    /// Prompt for `permissions` and return the verdict for each.
    async fn request(&self, permissions: &[&str]) -> Result<BTreeMap<String, bool>>;
}

/// Gate that requires [`REQUIRED_PERMISSIONS`] through a [`PermissionBackend`].
///
/// Backend failures and missing verdicts count as denials.
pub struct GranularPermissionGate<B> {
    backend: B,
}

impl<B: PermissionBackend> GranularPermissionGate<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: PermissionBackend> PermissionGate for GranularPermissionGate<B> {
    async fn check_all_permissions(&self) -> PermissionStatus {
        let mut permissions = BTreeMap::new();
        for name in REQUIRED_PERMISSIONS {
            let granted = match self.backend.is_granted(name).await {
                Ok(granted) => granted,
                Err(e) => {
                    warn!("Permission check for {} failed: {}", name, e);
                    false
                }
            };
            permissions.insert(name.to_string(), granted);
        }
        let status = PermissionStatus::from_permissions(permissions);
        debug!("Permission check: granted={}", status.granted);
        status
    }

    async fn request_all_permissions(&self) -> PermissionStatus {
        let verdicts = match self.backend.request(&REQUIRED_PERMISSIONS).await {
            Ok(verdicts) => verdicts,
            Err(e) => {
                warn!("Permission request failed: {}", e);
                BTreeMap::new()
            }
        };
        let permissions = REQUIRED_PERMISSIONS
            .iter()
            .map(|name| {
                let granted = verdicts.get(*name).copied().unwrap_or(false);
                (name.to_string(), granted)
            })
            .collect();
        let status = PermissionStatus::from_permissions(permissions);
        if !status.granted {
            warn!("Missing Bluetooth permissions: {}", status.missing().join(", "));
        }
        status
    }
}

/// The gate for the current platform when no backend is supplied.
///
/// Platforms with a granular model get a gate that denies everything until
/// the host provides a real backend.
pub fn platform_gate() -> Arc<dyn PermissionGate> {
    if Platform::current().has_granular_permissions() {
        Arc::new(GranularPermissionGate::new(UnavailableBackend))
    } else {
        Arc::new(NoPermissionModel)
    }
}

struct UnavailableBackend;

#[async_trait]
impl PermissionBackend for UnavailableBackend {
    async fn is_granted(&self, _permission: &str) -> Result<bool> {
        Ok(false)
    }

    async fn request(&self, _permissions: &[&str]) -> Result<BTreeMap<String, bool>> {
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::collections::HashSet;

    struct FixedBackend {
        granted: HashSet<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl PermissionBackend for FixedBackend {
        async fn is_granted(&self, permission: &str) -> Result<bool> {
            if self.fail {
                return Err(Error::invalid_config("backend offline"));
            }
            Ok(self.granted.contains(permission))
        }

        async fn request(&self, permissions: &[&str]) -> Result<BTreeMap<String, bool>> {
            if self.fail {
                return Err(Error::invalid_config("backend offline"));
            }
            Ok(permissions
                .iter()
                .map(|p| (p.to_string(), self.granted.contains(*p)))
                .collect())
        }
    }

    fn gate(granted: &[&'static str], fail: bool) -> GranularPermissionGate<FixedBackend> {
        GranularPermissionGate::new(FixedBackend {
            granted: granted.iter().copied().collect(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_desktop_grants_trivially() {
        let status = NoPermissionModel.request_all_permissions().await;
        assert!(status.granted);
        assert!(status.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_all_granted() {
        let status = gate(&REQUIRED_PERMISSIONS, false).check_all_permissions().await;
        assert!(status.granted);
        assert_eq!(status.permissions.len(), 4);
    }

    #[tokio::test]
    async fn test_one_denied_fails_closed() {
        let status = gate(
            &["BLUETOOTH_SCAN", "BLUETOOTH_CONNECT", "ACCESS_FINE_LOCATION"],
            false,
        )
        .request_all_permissions()
        .await;
        assert!(!status.granted);
        assert_eq!(status.missing(), vec!["ACCESS_COARSE_LOCATION".to_string()]);
    }

    #[tokio::test]
    async fn test_backend_error_is_denial() {
        let g = gate(&REQUIRED_PERMISSIONS, true);
        assert!(!g.check_all_permissions().await.granted);
        let status = g.request_all_permissions().await;
        assert!(!status.granted);
        assert_eq!(status.missing().len(), 4);
    }
}
