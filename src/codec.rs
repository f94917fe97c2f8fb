//! Binary/text conversion for ciphertext, salt and IV transport

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;

/// Encode bytes as standard (padded) base64
pub fn encode(bytes: &[u8]) -> String {
	STANDARD.encode(bytes)
}

/// Decode standard base64 text
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
	Ok(STANDARD.decode(text.trim())?)
}

/// Decode base64 text into a fixed-size array
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], CodecError> {
	let bytes = decode(text)?;
	bytes_to_array(&bytes)
}

/// Copy a slice into a fixed-size array, enforcing the exact length
pub fn bytes_to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], CodecError> {
	bytes
		.try_into()
		.map_err(|_| CodecError::InvalidLength { expected: N, actual: bytes.len() })
}

/// Serde adapter writing `Vec<u8>` fields as base64 strings
pub mod base64_bytes {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&super::encode(bytes))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let text = String::deserialize(deserializer)?;
		super::decode(&text).map_err(serde::de::Error::custom)
	}
}


// vim: ts=4
