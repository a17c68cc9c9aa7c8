use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// These can be removed when [`serde`] supports
/// literal defaults: <https://github.com/serde-rs/serde/issues/368>
#[inline]
fn ten() -> i64 {
	10
}

/// Limit/offset pagination parameters.
#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct LimitOffset {
	/// The number of items to return.
	#[validate(range(min = 1, max = 100))]
	#[serde(default = "ten")]
	pub limit: i64,
	/// The number of items to skip.
	#[validate(range(min = 0))]
	#[serde(default)]
	pub offset: i64,
}

impl LimitOffset {
	pub fn offset(&self) -> i64 {
		self.offset
	}

	pub fn limit(&self) -> i64 {
		self.limit
	}

	/// Wraps one page of results, with links to the neighbouring pages
	/// built from `path` (the request path without a query string).
	pub fn page<T>(&self, path: &str, count: i64, results: Vec<T>) -> Page<T> {
		// an offset that cannot be advanced has no next page
		let next = self
			.offset
			.checked_add(self.limit)
			.filter(|&offset| offset < count)
			.map(|offset| format!("{path}?limit={}&offset={offset}", self.limit));

		let previous = (self.offset > 0).then(|| {
			let offset = self.offset - self.limit;

			if offset <= 0 {
				format!("{path}?limit={}", self.limit)
			} else {
				format!("{path}?limit={}&offset={offset}", self.limit)
			}
		});

		Page {
			count,
			next_offset: offset_from_url(next.as_deref()),
			previous_offset: offset_from_url(previous.as_deref()),
			next,
			previous,
			results,
		}
	}
}

/// A page of results.
#[derive(Debug, Serialize, JsonSchema)]
pub struct Page<T> {
	/// The total number of items.
	pub count: i64,
	/// Link to the next page, if any.
	pub next: Option<String>,
	/// Link to the previous page, if any.
	pub previous: Option<String>,
	/// The `offset` of the next page, if it has one.
	pub next_offset: Option<String>,
	/// The `offset` of the previous page, if it has one.
	pub previous_offset: Option<String>,
	pub results: Vec<T>,
}

/// Reads the `offset` query parameter out of a url.
pub fn offset_from_url(url: Option<&str>) -> Option<String> {
	let (_, query) = url?.split_once('?')?;

	query
		.split('&')
		.filter_map(|pair| pair.split_once('='))
		.find(|(key, _)| *key == "offset")
		.map(|(_, value)| value.to_string())
}

#[derive(Deserialize, Validate, JsonSchema)]
pub struct IdInput {
	pub id: Uuid,
}

#[cfg(test)]
mod test {
	use super::*;

	fn paginate(limit: i64, offset: i64) -> LimitOffset {
		LimitOffset { limit, offset }
	}

	#[test]
	fn test_first_page() {
		let page = paginate(10, 0).page("/user", 25, vec![(); 10]);

		assert_eq!(page.next.as_deref(), Some("/user?limit=10&offset=10"));
		assert_eq!(page.next_offset.as_deref(), Some("10"));
		assert_eq!(page.previous, None);
		assert_eq!(page.previous_offset, None);
	}

	#[test]
	fn test_second_page_previous_has_no_offset() {
		let page = paginate(10, 10).page("/user", 25, vec![(); 10]);

		assert_eq!(page.previous.as_deref(), Some("/user?limit=10"));
		assert_eq!(page.previous_offset, None);
		assert_eq!(page.next_offset.as_deref(), Some("20"));
	}

	#[test]
	fn test_last_page() {
		let page = paginate(10, 20).page("/user", 25, vec![(); 5]);

		assert_eq!(page.next, None);
		assert_eq!(page.next_offset, None);
		assert_eq!(page.previous_offset.as_deref(), Some("10"));
		assert_eq!(page.count, 25);
	}

	#[test]
	fn test_offset_past_the_end_has_no_next_page() {
		let paginate: LimitOffset =
			serde_json::from_value(serde_json::json!({ "limit": 10, "offset": i64::MAX })).unwrap();

		assert!(paginate.validate().is_ok());

		let page = paginate.page("/user", 5, Vec::<()>::new());

		assert_eq!(page.next, None);
		assert_eq!(page.next_offset, None);
		assert_eq!(
			page.previous.as_deref(),
			Some(format!("/user?limit=10&offset={}", i64::MAX - 10).as_str())
		);
	}

	#[test]
	fn test_offset_from_url() {
		assert_eq!(offset_from_url(None), None);
		assert_eq!(offset_from_url(Some("/user")), None);
		assert_eq!(offset_from_url(Some("/user?limit=5")), None);
		assert_eq!(
			offset_from_url(Some("/user?offset=15&limit=5")).as_deref(),
			Some("15")
		);
	}

	#[test]
	fn test_limit_and_offset() {
		let paginate = paginate(5, 15);

		assert_eq!(paginate.limit(), 5);
		assert_eq!(paginate.offset(), 15);
	}
}
