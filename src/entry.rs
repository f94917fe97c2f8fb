//! Sealing plaintext payloads into records and opening them again
//!
//! Records hold JSON encrypted under a key derived from the session password
//! and the record's own salt. Opening a batch never fails as a whole: records
//! that do not decrypt or parse are reported by id instead.

use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec;
use crate::crypto::{decrypt, encrypt, generate_salt, IV_LEN, SALT_LEN};
use crate::error::VaultError;
use crate::logging::*;
use crate::session::Session;
use crate::types::{Record, Timestamp};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginData {
	pub username: String,
	pub password: String,
	pub url: String,
	pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordData {
	pub password: String,
	pub url: String,
	pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteData {
	pub note: String,
}

/// Type-specific part of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
	Login(LoginData),
	Password(PasswordData),
	Note(NoteData),
}

impl EntryKind {
	pub fn type_name(&self) -> &'static str {
		match self {
			EntryKind::Login(_) => "login",
			EntryKind::Password(_) => "password",
			EntryKind::Note(_) => "note",
		}
	}
}

/// Plaintext of an `entries` record
///
/// Serialised as `{title, description, type, data}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WirePayload", try_from = "WirePayload")]
pub struct EntryPayload {
	pub title: String,
	pub description: String,
	pub kind: EntryKind,
}

#[derive(Serialize, Deserialize)]
struct WirePayload {
	#[serde(default)]
	title: String,
	#[serde(default)]
	description: String,
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	data: serde_json::Value,
}

impl From<EntryPayload> for WirePayload {
	fn from(payload: EntryPayload) -> Self {
		let kind = payload.kind.type_name().to_string();
		let data = match &payload.kind {
			EntryKind::Login(d) => serde_json::to_value(d),
			EntryKind::Password(d) => serde_json::to_value(d),
			EntryKind::Note(d) => serde_json::to_value(d),
		}
		.unwrap_or_default();
		WirePayload { title: payload.title, description: payload.description, kind, data }
	}
}

impl TryFrom<WirePayload> for EntryPayload {
	type Error = String;

	fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
		let data = if wire.data.is_null() { serde_json::json!({}) } else { wire.data };
		let kind = match wire.kind.as_str() {
			"login" => serde_json::from_value(data).map(EntryKind::Login),
			"password" => serde_json::from_value(data).map(EntryKind::Password),
			"note" => serde_json::from_value(data).map(EntryKind::Note),
			other => return Err(format!("unknown entry type: {}", other)),
		}
		.map_err(|e| e.to_string())?;
		Ok(EntryPayload { title: wire.title, description: wire.description, kind })
	}
}

/// Projection of a successfully opened entry; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedEntry {
	pub id: Uuid,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
	pub payload: EntryPayload,
}

/// Result of opening a batch of records
#[derive(Debug, Default)]
pub struct Decrypted {
	pub entries: Vec<DecryptedEntry>,
	pub corrupted_ids: Vec<Uuid>,
}

/// Encrypt any JSON-serialisable value into a fresh record
pub fn seal<T: Serialize>(
	session: &Session,
	owner_id: Uuid,
	id: Uuid,
	value: &T,
) -> Result<Record, VaultError> {
	let now = Utc::now();
	let mut record = Record {
		id,
		owner_id,
		ciphertext: Vec::new(),
		salt: Vec::new(),
		iv: Vec::new(),
		created_at: now,
		updated_at: now,
	};
	reseal(session, &mut record, value)?;
	Ok(record)
}

/// Replace a record's payload with `value` under a fresh salt and IV
///
/// `updated_at` is bumped past its previous value even if the clock is not.
pub fn reseal<T: Serialize>(
	session: &Session,
	record: &mut Record,
	value: &T,
) -> Result<(), VaultError> {
	let plaintext = serde_json::to_string(value)?;
	let salt = generate_salt();
	let key = session.key_for(&salt)?;
	let sealed = encrypt(&plaintext, &key)?;

	let now = Utc::now();
	record.ciphertext = sealed.ciphertext;
	record.salt = salt.to_vec();
	record.iv = sealed.iv.to_vec();
	record.updated_at = if now > record.updated_at {
		now
	} else {
		record.updated_at + chrono::Duration::milliseconds(1)
	};
	Ok(())
}

pub fn seal_payload(
	session: &Session,
	owner_id: Uuid,
	id: Uuid,
	payload: &EntryPayload,
) -> Result<Record, VaultError> {
	seal(session, owner_id, id, payload)
}

/// Decrypt and parse one record
pub fn open<T: DeserializeOwned>(session: &Session, record: &Record) -> Result<T, VaultError> {
	let salt = codec::bytes_to_array::<SALT_LEN>(&record.salt)?;
	codec::bytes_to_array::<IV_LEN>(&record.iv)?;
	let key = session.key_for(&salt)?;
	let plaintext = decrypt(&record.ciphertext, &record.iv, &key)?;
	Ok(serde_json::from_str(&plaintext)?)
}

/// Open every record in parallel on blocking workers
///
/// Key derivation dominates the cost, so each record gets its own worker.
/// Entries come back in input order.
pub async fn open_entries(session: &Session, records: Vec<Record>) -> Decrypted {
	let tasks = records.into_iter().map(|record| {
		let session = session.clone();
		let id = record.id;
		let handle = tokio::task::spawn_blocking(move || {
			let payload = open::<EntryPayload>(&session, &record)?;
			Ok::<_, VaultError>(DecryptedEntry {
				id: record.id,
				created_at: record.created_at,
				updated_at: record.updated_at,
				payload,
			})
		});
		async move { (id, handle.await) }
	});

	let mut decrypted = Decrypted::default();
	for (id, result) in join_all(tasks).await {
		match result {
			Ok(Ok(entry)) => decrypted.entries.push(entry),
			Ok(Err(e)) => {
				warn!("Entry {} is corrupted: {}", id, e);
				decrypted.corrupted_ids.push(id);
			}
			Err(e) => {
				error!("Decrypt worker for {} failed: {}", id, e);
				decrypted.corrupted_ids.push(id);
			}
		}
	}
	decrypted
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::crypto::KdfParams;

	fn session(password: &str) -> Session {
		Session::new(password, KdfParams::custom(8192, 1, 1)).unwrap()
	}

	fn login() -> EntryPayload {
		EntryPayload {
			title: "bank".into(),
			description: "checking".into(),
			kind: EntryKind::Login(LoginData {
				username: "alice".into(),
				password: "pw".into(),
				url: "https://bank.example".into(),
				note: String::new(),
			}),
		}
	}

	#[test]
	fn test_payload_wire_shape() {
		let json = serde_json::to_value(login()).unwrap();
		assert_eq!(json["type"], "login");
		assert_eq!(json["data"]["username"], "alice");

		let note: EntryPayload =
			serde_json::from_str(r#"{"title":"t","description":"","type":"note","data":{"note":"n"}}"#)
				.unwrap();
		assert_eq!(note.kind, EntryKind::Note(NoteData { note: "n".into() }));

		assert!(serde_json::from_str::<EntryPayload>(r#"{"title":"t","type":"card"}"#).is_err());
	}

	#[test]
	fn test_seal_and_open() {
		let s = session("correct horse");
		let record = seal_payload(&s, Uuid::nil(), Uuid::new_v4(), &login()).unwrap();
		assert_eq!(record.salt.len(), SALT_LEN);
		assert_eq!(record.iv.len(), IV_LEN);
		assert_eq!(open::<EntryPayload>(&s, &record).unwrap(), login());
	}

	#[test]
	fn test_reseal_bumps_timestamp_and_salt() {
		let s = session("correct horse");
		let mut record = seal_payload(&s, Uuid::nil(), Uuid::new_v4(), &login()).unwrap();
		let (salt, updated) = (record.salt.clone(), record.updated_at);
		reseal(&s, &mut record, &login()).unwrap();
		assert_ne!(record.salt, salt);
		assert!(record.updated_at > updated);
	}

	#[tokio::test]
	async fn test_open_entries_reports_corrupted() {
		let s = session("correct horse");
		let good = seal_payload(&s, Uuid::nil(), Uuid::new_v4(), &login()).unwrap();
		let mut tampered = seal_payload(&s, Uuid::nil(), Uuid::new_v4(), &login()).unwrap();
		tampered.ciphertext[0] ^= 0x01;
		let mut short_iv = seal_payload(&s, Uuid::nil(), Uuid::new_v4(), &login()).unwrap();
		short_iv.iv.truncate(4);

		let out = open_entries(&s, vec![good.clone(), tampered.clone(), short_iv.clone()]).await;
		assert_eq!(out.entries.len(), 1);
		assert_eq!(out.entries[0].id, good.id);
		assert_eq!(out.corrupted_ids, vec![tampered.id, short_iv.id]);
	}

	#[tokio::test]
	async fn test_wrong_password_marks_all_corrupted() {
		let record = seal_payload(&session("one"), Uuid::nil(), Uuid::new_v4(), &login()).unwrap();
		let out = open_entries(&session("two"), vec![record.clone()]).await;
		assert!(out.entries.is_empty());
		assert_eq!(out.corrupted_ids, vec![record.id]);
	}
}

// vim: ts=4
