//! Identifier helpers shared by the transport and the CLI.

use btleplug::platform::PeripheralId;

use vitals_types::DeviceDescriptor;

/// Address reported by CoreBluetooth, which hides MAC addresses.
pub const PLACEHOLDER_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the
/// BlueZ object path or the MAC address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Pick the identifier to expose for a peripheral.
///
/// Uses the Bluetooth address unless it is the macOS placeholder, in which
/// case the formatted peripheral ID is used.
pub fn identifier_for(address: &str, peripheral_id: &str) -> String {
    if address == PLACEHOLDER_ADDRESS {
        peripheral_id.to_string()
    } else {
        address.to_string()
    }
}

/// [`identifier_for`] on a btleplug peripheral ID.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    identifier_for(address, &format_peripheral_id(peripheral_id))
}

fn normalize(id: &str) -> String {
    id.chars()
        .filter(|c| *c != ':' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether a user-supplied `query` names this device.
///
/// Identifiers match case-insensitively with `:` and `-` ignored; names match
/// on a case-insensitive substring.
pub fn identifier_matches(query: &str, device: &DeviceDescriptor) -> bool {
    let query_norm = normalize(query);
    if query_norm.is_empty() {
        return false;
    }
    if normalize(&device.id) == query_norm {
        return true;
    }
    device
        .name
        .as_ref()
        .is_some_and(|name| name.to_lowercase().contains(&query.to_lowercase()))
}
