pub const COOKIE_NAME: &str = "token";

/// Creates a cookie carrying a login token, living as long as the token.
pub fn create_cookie(key: &str, lifetime: chrono::Duration) -> cookie::Cookie<'static> {
	cookie::Cookie::build((COOKIE_NAME, key.to_string()))
		.secure(!cfg!(debug_assertions))
		.http_only(true)
		.same_site(cookie::SameSite::Lax)
		.path("/")
		.max_age(cookie::time::Duration::seconds(lifetime.num_seconds()))
		.into()
}

/// Creates an empty token cookie used to invalidate a previous one.
pub fn clear_cookie() -> cookie::Cookie<'static> {
	cookie::Cookie::build(COOKIE_NAME)
		.http_only(true)
		.path("/")
		.max_age(cookie::time::Duration::ZERO)
		.into()
}
