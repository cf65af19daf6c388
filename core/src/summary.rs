//! The JSON record sent to the decision service for each command.

use serde::{Deserialize, Serialize};

use crate::packet::{FieldValue, Packet};

/// Reported as `keycloak_id` when no identity is configured.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Identifying fields of one command packet.
///
/// Field order is the wire key order. Absent header fields serialize as
/// `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSummary {
    pub keycloak_id: String,
    pub target: String,
    pub packet_name: String,
    pub stream_id: Option<FieldValue>,
    pub function_code: Option<FieldValue>,
}

impl CommandSummary {
    /// Copy the identifying fields out of `packet`.
    pub fn from_packet<P: Packet + ?Sized>(
        packet: &P,
        identity: Option<&str>,
        stream_id_field: &str,
        function_code_field: &str,
    ) -> Self {
        Self {
            keycloak_id: identity.unwrap_or(UNKNOWN_IDENTITY).to_string(),
            target: packet.target_name().to_string(),
            packet_name: packet.packet_name().to_string(),
            stream_id: packet.read_field(stream_id_field),
            function_code: packet.read_field(function_code_field),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
