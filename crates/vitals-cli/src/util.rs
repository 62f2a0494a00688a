//! Utility functions for CLI operations.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use vitals_core::ApiClient;
use vitals_store::StorageFacade;

use crate::config::Config;

/// Get device identifier, with helpful error message.
pub fn require_device(device: Option<String>) -> Result<String> {
    device.ok_or_else(|| {
        anyhow::anyhow!(
            "No device specified. Use --device <ID> or set VITALS_DEVICE environment variable.\n\
             Run 'vitals scan' to find nearby devices."
        )
    })
}

/// Attach the remediation hint, if any, to a core error.
pub fn with_hint(error: vitals_core::Error) -> anyhow::Error {
    match error.remediation() {
        Some(hint) => anyhow::anyhow!("{}\n\nTip: {}", error, hint),
        None => error.into(),
    }
}

/// Open the storage facade in `dir`, or the platform data directory.
pub fn open_storage(dir: Option<&Path>) -> Result<Arc<StorageFacade>> {
    let dir = dir
        .map(Path::to_path_buf)
        .unwrap_or_else(vitals_store::default_storage_dir);
    let storage = StorageFacade::open(&dir)
        .with_context(|| format!("Failed to open storage in {}", dir.display()))?;
    Ok(Arc::new(storage))
}

/// Build an API client from config, attaching the stored token if any.
pub fn api_client(config: &Config, storage: &StorageFacade) -> Result<ApiClient> {
    let Some(url) = config.api_url.as_deref() else {
        bail!(
            "No API URL configured.\n\
             Run 'vitals config set api-url <URL>' first."
        );
    };
    let mut client = ApiClient::new(url).context("Invalid API URL")?;
    if let Some(token) = storage.auth_token().context("Failed to read API token")? {
        client = client.with_token(token);
    }
    Ok(client)
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_device_with_some() {
        let result = require_device(Some("AA:BB:CC:DD:EE:FF".to_string()));
        assert_eq!(result.unwrap(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_require_device_with_none() {
        let err = require_device(None).unwrap_err().to_string();
        assert!(err.contains("No device specified"));
        assert!(err.contains("VITALS_DEVICE"));
    }

    #[test]
    fn test_with_hint_adds_remediation() {
        let err = with_hint(vitals_core::Error::PermissionDenied {
            missing: vec!["bluetooth_scan".into()],
        });
        assert!(err.to_string().contains("Tip: Grant Bluetooth"));

        let err = with_hint(vitals_core::Error::InvalidData("bad".into()));
        assert!(!err.to_string().contains("Tip:"));
    }

    #[test]
    fn test_api_client_requires_url() {
        let storage = StorageFacade::open_in_memory().unwrap();
        let err = api_client(&Config::default(), &storage).unwrap_err();
        assert!(err.to_string().contains("No API URL configured"));

        let config = Config {
            api_url: Some("https://api.example.com".into()),
            ..Default::default()
        };
        let client = api_client(&config, &storage).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
    }

    #[test]
    fn test_open_storage_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        let storage = open_storage(Some(&path)).unwrap();
        assert!(path.join("general.db").exists());
        assert_eq!(storage.pending_sync().unwrap().len(), 0);
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
