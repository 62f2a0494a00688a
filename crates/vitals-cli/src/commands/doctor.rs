//! Doctor command implementation.
//!
//! Checks Bluetooth permissions and adapter availability to help
//! troubleshoot connectivity issues.

use anyhow::Result;
use vitals_core::{BtleplugTransport, PermissionGate, Platform, platform_gate};

use crate::style;

/// Check result with status and message.
struct Check {
    passed: bool,
    warning: bool,
    message: String,
}

impl Check {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            warning: false,
            message: message.into(),
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            warning: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            warning: false,
            message: message.into(),
        }
    }

    fn render(&self, no_color: bool) -> String {
        if !self.passed {
            style::format_failure(&self.message, no_color)
        } else if self.warning {
            style::format_warning(&self.message, no_color)
        } else {
            style::format_success(&self.message, no_color)
        }
    }
}

pub async fn cmd_doctor(no_color: bool) -> Result<()> {
    println!(
        "{}",
        style::format_title("Vitals Doctor - BLE Diagnostics", no_color)
    );
    println!();

    let gate = platform_gate();
    let checks = vec![
        check_permissions(gate.as_ref()).await,
        check_adapter().await,
    ];
    for check in &checks {
        println!("{}", check.render(no_color));
    }

    println!();
    let failed = checks.iter().filter(|c| !c.passed).count();
    if failed == 0 {
        println!("{}", style::format_success("Ready to scan", no_color));
    } else {
        println!(
            "{}",
            style::format_failure(&format!("{} check(s) failed", failed), no_color)
        );
    }
    Ok(())
}

async fn check_permissions(gate: &dyn PermissionGate) -> Check {
    let status = gate.check_all_permissions().await;
    if status.granted {
        if Platform::current().has_granular_permissions() {
            Check::pass("Bluetooth permissions granted")
        } else {
            Check::pass("No runtime Bluetooth permissions needed on this platform")
        }
    } else {
        Check::fail(format!(
            "Missing permissions: {}",
            status.missing().join(", ")
        ))
    }
}

async fn check_adapter() -> Check {
    match BtleplugTransport::new().await {
        Ok(_) => Check::pass("Bluetooth adapter available"),
        Err(e) => match e.remediation() {
            Some(hint) => Check::fail(format!("No usable adapter: {}. {}", e, hint)),
            None => Check::warn(format!("Adapter check inconclusive: {}", e)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_core::MockPermissions;

    #[tokio::test]
    async fn test_permission_check_reports_missing() {
        let check = check_permissions(&MockPermissions::denied()).await;
        assert!(!check.passed);
        assert!(check.message.starts_with("Missing permissions:"));
        assert!(check.message.contains("BLUETOOTH_SCAN"));
    }

    #[tokio::test]
    async fn test_permission_check_passes() {
        let check = check_permissions(&MockPermissions::granted()).await;
        assert!(check.passed);
        assert_eq!(check.render(true).get(..4), Some("[OK]"));
    }
}
