use uuid::Uuid;

use crate::{
	error::AppError,
	route::user::model::{User, UserIp, UserType},
};

/// Something that belongs to a single user.
pub trait Owned {
	fn owner_id(&self) -> Uuid;
}

/// A profile is owned by the user it describes.
impl Owned for User {
	fn owner_id(&self) -> Uuid {
		self.id
	}
}

impl Owned for UserIp {
	fn owner_id(&self) -> Uuid {
		self.user_id
	}
}

pub fn is_admin(user: &User) -> bool {
	user.user_type == UserType::Admin
}

/// Whether `user` may access `object`: admins may access everything,
/// everyone else only what they own.
pub fn has_object_permission(user: &User, object: &impl Owned) -> bool {
	is_admin(user) || object.owner_id() == user.id
}

pub fn check_object_permission(user: &User, object: &impl Owned) -> Result<(), AppError> {
	if has_object_permission(user, object) {
		Ok(())
	} else {
		Err(AppError::Forbidden)
	}
}

#[cfg(test)]
mod test {
	use chrono::Utc;

	use super::*;
	use crate::test::user;

	#[test]
	fn test_admin_permission() {
		assert!(is_admin(&user(UserType::Admin)));
		assert!(!is_admin(&user(UserType::Normal)));
	}

	#[test]
	fn test_own_profile_view_permission() {
		let john = user(UserType::Normal);
		let jane = user(UserType::Normal);
		let admin = user(UserType::Admin);

		assert!(has_object_permission(&john, &john));
		assert!(!has_object_permission(&john, &jane));
		assert!(has_object_permission(&admin, &jane));
	}

	#[test]
	fn test_own_profile_permission() {
		let john = user(UserType::Normal);
		let jane = user(UserType::Normal);
		let ip = UserIp {
			id: Uuid::new_v4(),
			user_id: john.id,
			ip_address: "127.0.0.1".into(),
			created_at: Utc::now(),
		};

		assert!(check_object_permission(&john, &ip).is_ok());
		assert!(matches!(
			check_object_permission(&jane, &ip),
			Err(AppError::Forbidden)
		));
	}
}
