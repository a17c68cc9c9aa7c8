use uuid::Uuid;

use crate::{
	error::AppError,
	route::user::{
		model::{User, UserType},
		password::hash_password,
	},
	State,
};

pub const ADMIN_EMAIL: &str = "admin@mail.com";
pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin";

/// Whether [`makesuper`] created the account or found it already there.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
	Created,
	AlreadyExists,
}

/// Creates the default admin account unless a user with its email exists.
pub async fn create_admin(state: &State) -> Result<Outcome, AppError> {
	let mut tx = state.database.begin().await?;

	if User::by_email(&mut *tx, ADMIN_EMAIL).await?.is_some() {
		return Ok(Outcome::AlreadyExists);
	}

	let id = Uuid::new_v4();
	let hashed = hash_password(&state.hasher, ADMIN_PASSWORD, &id)?;

	sqlx::query(
		r#"
			INSERT INTO "user" (
				id, email, username, password, user_type,
				is_staff, is_superuser, is_verified
			)
			VALUES ($1, $2, $3, $4, $5, TRUE, TRUE, TRUE)
		"#,
	)
	.bind(id)
	.bind(ADMIN_EMAIL)
	.bind(ADMIN_USERNAME)
	.bind(&hashed[..])
	.bind(UserType::Admin.as_str())
	.execute(&mut *tx)
	.await?;

	tx.commit().await?;

	Ok(Outcome::Created)
}

/// The `makesuper` command.
pub async fn makesuper(state: &State) -> Result<(), AppError> {
	match create_admin(state).await? {
		Outcome::Created => {
			tracing::info!(email = ADMIN_EMAIL, "admin user created");
			println!("Admin user has been created");
		}
		Outcome::AlreadyExists => {
			tracing::warn!(email = ADMIN_EMAIL, "admin user already exists");
			eprintln!("Admin user already exists");
		}
	}

	Ok(())
}
