//! In-memory token lifecycle state and token-endpoint response shapes.

mod secret;

pub use secret::TokenSecret;

// crates.io
use time::{
	PrimitiveDateTime, format_description::well_known::Rfc3339, macros::format_description,
};
// self
use crate::_prelude::*;

/// Mutable access-token state owned by one client instance.
///
/// `expires_at` is only meaningful while a token is held; both fields are
/// always set and cleared together. The client never persists this state;
/// callers that want tokens to survive a process restart snapshot it through
/// the client's accessors and restore it at construction.
#[derive(Clone, Debug, Default)]
pub struct TokenState {
	access_token: Option<TokenSecret>,
	expires_at: Option<OffsetDateTime>,
}
impl TokenState {
	/// Empty, unauthenticated state.
	pub fn new() -> Self {
		Self::default()
	}

	/// Currently held access token, if any.
	pub fn access_token(&self) -> Option<&TokenSecret> {
		self.access_token.as_ref()
	}

	/// Expiry instant of the held token, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}

	/// `true` while an access token is held.
	pub fn is_authorized(&self) -> bool {
		self.access_token.is_some()
	}

	/// Checks expiry against the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.expires_at, Some(expiry) if expiry < instant)
	}

	/// Checks expiry against the current UTC clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	pub(crate) fn authorize(&mut self, token: impl Into<String>, expires_at: OffsetDateTime) {
		self.access_token = Some(TokenSecret::new(token));
		self.expires_at = Some(expires_at);
	}

	pub(crate) fn clear(&mut self) {
		self.access_token = None;
		self.expires_at = None;
	}
}

/// Body of a successful code exchange.
///
/// `expires_in` is a lifetime in seconds relative to the issue instant.
#[derive(Clone, Debug, Deserialize)]
pub struct IssuedToken {
	/// Newly issued access token.
	pub access_token: String,
	/// Token lifetime in seconds.
	pub expires_in: i64,
}
impl IssuedToken {
	/// Expiry instant for a token issued at `issued_at`.
	pub fn expires_at(&self, issued_at: OffsetDateTime) -> OffsetDateTime {
		issued_at + Duration::seconds(self.expires_in)
	}
}

/// Body of a successful token refresh.
///
/// Unlike the code exchange, the refresh endpoint reports the new expiry as
/// an absolute timestamp string. The two endpoints are not symmetric and each
/// is parsed with its own rule.
#[derive(Clone, Debug, Deserialize)]
pub struct RefreshedToken {
	/// Replacement access token.
	pub access_token: String,
	/// Absolute expiry stamp.
	pub expires_in: String,
}
impl RefreshedToken {
	/// Parses the absolute expiry stamp.
	pub fn expires_at(&self) -> Result<OffsetDateTime, ExpiryStampError> {
		parse_expiry_stamp(&self.expires_in)
	}
}

/// Raised when the refresh endpoint reports an expiry stamp in an unknown
/// format.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unrecognized expiry stamp `{value}`.")]
pub struct ExpiryStampError {
	/// Raw stamp as received.
	pub value: String,
}

/// Parses an absolute expiry stamp.
///
/// Accepts unix seconds, RFC 3339, and `YYYY-MM-DD HH:MM:SS` (read as UTC).
pub fn parse_expiry_stamp(value: &str) -> Result<OffsetDateTime, ExpiryStampError> {
	let raw = value.trim();

	if let Ok(seconds) = raw.parse::<i64>() {
		return OffsetDateTime::from_unix_timestamp(seconds)
			.map_err(|_| ExpiryStampError { value: value.to_owned() });
	}
	if let Ok(stamp) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Ok(stamp);
	}

	let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

	PrimitiveDateTime::parse(raw, &format)
		.map(PrimitiveDateTime::assume_utc)
		.map_err(|_| ExpiryStampError { value: value.to_owned() })
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn expiry_check_is_strict_on_the_boundary() {
		let now = OffsetDateTime::now_utc();
		let mut state = TokenState::new();

		assert!(!state.is_expired());

		state.authorize("token", now - Duration::seconds(1));

		assert!(state.is_expired_at(now));

		state.authorize("token", now + Duration::seconds(3600));

		assert!(!state.is_expired_at(now));
		assert!(state.is_expired_at(now + Duration::seconds(3601)));
	}

	#[test]
	fn clear_drops_both_fields() {
		let mut state = TokenState::new();

		state.authorize("token", OffsetDateTime::now_utc());

		assert!(state.is_authorized());

		state.clear();

		assert!(!state.is_authorized());
		assert_eq!(state.expires_at(), None);
	}

	#[test]
	fn issued_token_expiry_is_relative() {
		let grant = IssuedToken { access_token: "issued".to_owned(), expires_in: 3600 };
		let issued_at = datetime!(2025-01-01 00:00 UTC);

		assert_eq!(grant.expires_at(issued_at), datetime!(2025-01-01 01:00 UTC));
	}

	#[test]
	fn expiry_stamp_parser_covers_all_shapes() {
		assert_eq!(
			parse_expiry_stamp("1735689600"),
			Ok(datetime!(2025-01-01 00:00 UTC)),
		);
		assert_eq!(
			parse_expiry_stamp("2025-01-01T00:00:00Z"),
			Ok(datetime!(2025-01-01 00:00 UTC)),
		);
		assert_eq!(
			parse_expiry_stamp("2025-01-01 00:00:00"),
			Ok(datetime!(2025-01-01 00:00 UTC)),
		);
	}

	#[test]
	fn unknown_expiry_stamp_is_an_error() {
		assert_eq!(
			parse_expiry_stamp("next tuesday"),
			Err(ExpiryStampError { value: "next tuesday".to_owned() }),
		);
	}
}
