use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Payload published for every note that needs (re-)indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingRequest {
	pub note_id: Uuid,
	/// Invalidate the note's existing embeddings before inserting the new one.
	#[serde(default)]
	pub delete_old_embedding: bool,
}
impl IndexingRequest {
	pub fn encode(&self) -> Result<Vec<u8>> {
		serde_json::to_vec(self).map_err(|err| Error::MalformedPayload { message: err.to_string() })
	}

	pub fn decode(payload: &[u8]) -> Result<Self> {
		serde_json::from_slice(payload)
			.map_err(|err| Error::MalformedPayload { message: err.to_string() })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_flag_defaults_to_false() {
		let id = Uuid::new_v4();
		let raw = format!(r#"{{"note_id":"{id}"}}"#);
		let request = IndexingRequest::decode(raw.as_bytes()).expect("decode failed");

		assert_eq!(request, IndexingRequest { note_id: id, delete_old_embedding: false });
	}

	#[test]
	fn wire_format_uses_snake_case_fields() {
		let id = Uuid::new_v4();
		let encoded = IndexingRequest { note_id: id, delete_old_embedding: true }
			.encode()
			.expect("encode failed");
		let value: serde_json::Value = serde_json::from_slice(&encoded).expect("json");

		assert_eq!(value["note_id"], id.to_string());
		assert_eq!(value["delete_old_embedding"], true);
	}

	#[test]
	fn garbage_is_malformed() {
		assert!(matches!(
			IndexingRequest::decode(b"not json"),
			Err(Error::MalformedPayload { .. })
		));
		assert!(matches!(
			IndexingRequest::decode(br#"{"note_id":"nope"}"#),
			Err(Error::MalformedPayload { .. })
		));
	}
}
