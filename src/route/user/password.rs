use argon2::Argon2;
use uuid::Uuid;

pub const KEY_LENGTH: usize = 32;

/// Hashes a password with Argon2, using the user's id as a salt.
pub fn hash_password(
	hasher: &Argon2,
	password: &str,
	id: &Uuid,
) -> Result<[u8; KEY_LENGTH], argon2::Error> {
	let mut hash = [0; KEY_LENGTH];

	hasher.hash_password_into(password.as_bytes(), id.as_bytes(), &mut hash)?;
	Ok(hash)
}

/// Checks `password` against the stored hash of the user with `id`.
pub fn verify_password(
	hasher: &Argon2,
	password: &str,
	id: &Uuid,
	hash: &[u8],
) -> Result<bool, argon2::Error> {
	Ok(constant_time_eq(&hash_password(hasher, password, id)?, hash))
}

/// Compares two byte strings in time independent of where they differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}

	a.iter().zip(b).fold(0, |diff, (x, y)| diff | (x ^ y)) == 0
}
