//! The on-mesh wrapping format.
//!
//! Published to and read from the broker topic as a self-describing JSON
//! object so peers interoperate regardless of implementation language:
//! `{"sender": "...", "data": "<base64>"}`.

use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Error)]
pub enum EnvelopeError {
	#[error("failed to deserialize mesh envelope: {0}")]
	Decode(#[from] serde_json::Error),
}

/// The original mDNS datagram's bytes, wrapped with the sender that
/// originated it. `data` is passed through opaquely — this crate never
/// inspects or rewrites it once parsed for filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshEnvelope {
	pub sender: String,
	pub data: Vec<u8>,
}

impl MeshEnvelope {
	pub fn new(sender: impl Into<String>, data: Vec<u8>) -> Self {
		Self { sender: sender.into(), data }
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		// Serialization of a well-formed struct to a String never fails.
		serde_json::to_vec(self).expect("MeshEnvelope always serializes")
	}

	pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
		Ok(serde_json::from_slice(bytes)?)
	}
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
	#[serde(rename = "Sender")]
	sender: String,
	#[serde(rename = "Data")]
	data: String,
}

impl Serialize for MeshEnvelope {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		WireEnvelope { sender: self.sender.clone(), data: base64::engine::general_purpose::STANDARD.encode(&self.data) }.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for MeshEnvelope {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let wire = WireEnvelope::deserialize(deserializer)?;
		let data = base64::engine::general_purpose::STANDARD.decode(wire.data).map_err(serde::de::Error::custom)?;
		Ok(MeshEnvelope { sender: wire.sender, data })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_json() {
		let envelope = MeshEnvelope::new("bridge-a", vec![1, 2, 3, 255, 0]);
		let bytes = envelope.to_bytes();
		let decoded = MeshEnvelope::from_bytes(&bytes).unwrap();
		assert_eq!(decoded, envelope);
	}

	#[test]
	fn wire_format_is_json_with_base64_data() {
		let envelope = MeshEnvelope::new("bridge-a", vec![0xde, 0xad, 0xbe, 0xef]);
		let json: serde_json::Value = serde_json::from_slice(&envelope.to_bytes()).unwrap();
		assert_eq!(json["Sender"], "bridge-a");
		assert_eq!(json["Data"], "3q2+7w==");
	}

	#[test]
	fn bad_json_fails_to_decode() {
		assert!(MeshEnvelope::from_bytes(b"not json").is_err());
	}
}
