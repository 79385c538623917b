//! Command datagram encoding.

use fanlink_core::Command;

/// Encodes a command as a compact UTF-8 JSON datagram, e.g. `{"power":true}`.
///
/// # Errors
///
/// Returns the serializer error; catalog commands always encode.
pub fn encode_command(command: &Command) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(command)
}
