//! Random password generator

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";
const SPACE: &[u8] = b" ";

/// Which character groups to draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeneratorOptions {
	pub length: usize,
	pub lowercase: bool,
	pub uppercase: bool,
	pub digits: bool,
	pub spaces: bool,
	pub special: bool,

	/// Guarantee at least one character from every selected group
	pub force_from_each_group: bool,
}

impl Default for GeneratorOptions {
	fn default() -> Self {
		GeneratorOptions {
			length: 20,
			lowercase: true,
			uppercase: true,
			digits: true,
			spaces: false,
			special: true,
			force_from_each_group: true,
		}
	}
}

impl GeneratorOptions {
	fn groups(&self) -> Vec<&'static [u8]> {
		[
			(self.lowercase, LOWERCASE),
			(self.uppercase, UPPERCASE),
			(self.digits, DIGITS),
			(self.spaces, SPACE),
			(self.special, SPECIAL),
		]
		.into_iter()
		.filter(|(enabled, _)| *enabled)
		.map(|(_, group)| group)
		.collect()
	}
}

/// Generate a password according to `options`
///
/// Indices are drawn with a uniform range sampler, so no group member is
/// favoured by modulo bias. Forced characters are shuffled into place.
pub fn generate_password(options: &GeneratorOptions) -> Result<String, CryptoError> {
	if options.length == 0 {
		return Err(CryptoError::InvalidInput {
			message: "password length must be greater than 0".into(),
		});
	}

	let groups = options.groups();
	if groups.is_empty() {
		return Err(CryptoError::InvalidInput { message: "no character groups selected".into() });
	}
	if options.force_from_each_group && groups.len() > options.length {
		return Err(CryptoError::InvalidInput {
			message: format!(
				"{} groups selected but password length is {}",
				groups.len(),
				options.length
			),
		});
	}

	let mut rng = OsRng;
	let pool: Vec<u8> = groups.concat();
	let mut password: Vec<u8> = Vec::with_capacity(options.length);

	if options.force_from_each_group {
		for group in &groups {
			password.push(group[rng.gen_range(0..group.len())]);
		}
	}
	while password.len() < options.length {
		password.push(pool[rng.gen_range(0..pool.len())]);
	}
	password.shuffle(&mut rng);

	// Every group is ASCII
	Ok(password.into_iter().map(char::from).collect())
}


// vim: ts=4
