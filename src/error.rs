//! Client-level error types shared across the exchange, token, and transport
//! layers.

// self
use crate::{_prelude::*, record::ExchangeRecord};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
///
/// Every unrecoverable condition surfaces through this type; callers branch on
/// [`Error::code`] and inspect the wrapped exchange via [`Error::record`] when
/// one exists.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Server rejected the exchange with an application error code.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// The invalid-token retry ran once and the server still rejected the
	/// token.
	#[error("Token refresh retry was exhausted.")]
	RetryExhausted(#[source] ApiError),
	/// HTTP method is outside the supported set; nothing was sent.
	#[error("HTTP method `{method}` is not supported.")]
	UnsupportedMethod {
		/// Rejected method.
		method: Method,
	},
	/// No access token is held, so the operation cannot proceed.
	#[error("No access token is currently held.")]
	Unauthenticated,
	/// Request URL failed to parse.
	#[error("Request URL is invalid.")]
	InvalidUrl(#[from] url::ParseError),
	/// Response body does not match the expected shape.
	#[error("Response body does not match the expected shape.")]
	ResponseParse {
		/// Structured decoding failure carrying the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Refresh endpoint reported an expiry stamp in an unknown format.
	#[error(transparent)]
	ExpiryStamp(#[from] crate::token::ExpiryStampError),
	/// Endpoint returned an empty collection where one element was expected.
	#[error("API returned an empty collection where a single element was expected.")]
	EmptyCollection,
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Machine-readable code for branch-style error handling.
	///
	/// Server-reported failures yield the server's code (or the HTTP status
	/// rendered as a string when the body carried no recognizable error
	/// shape); local failures yield a stable sentinel.
	pub fn code(&self) -> &str {
		match self {
			Self::Api(failure) | Self::RetryExhausted(failure) => failure.code(),
			Self::UnsupportedMethod { .. } => "unsupported_method",
			Self::Unauthenticated => "unauthenticated",
			Self::InvalidUrl(_) => "invalid_url",
			Self::ResponseParse { .. } => "invalid_response",
			Self::ExpiryStamp(_) => "invalid_expiry",
			Self::EmptyCollection => "empty_collection",
			Self::Transport(_) => "transport",
		}
	}

	/// Exchange record attached to the failure, when one was produced.
	pub fn record(&self) -> Option<&ExchangeRecord> {
		match self {
			Self::Api(failure) | Self::RetryExhausted(failure) => Some(failure.record()),
			_ => None,
		}
	}
}

/// One failed exchange: the server's code and description plus the record
/// that produced them.
#[derive(Debug, ThisError)]
#[error("API call failed with code `{code}`: {description}")]
pub struct ApiError {
	code: String,
	description: String,
	record: Box<ExchangeRecord>,
}
impl ApiError {
	pub(crate) fn new(
		code: impl Into<String>,
		description: impl Into<String>,
		record: ExchangeRecord,
	) -> Self {
		Self { code: code.into(), description: description.into(), record: Box::new(record) }
	}

	/// Server-supplied error code or stringified HTTP status.
	pub fn code(&self) -> &str {
		&self.code
	}

	/// Human-readable failure description.
	pub fn description(&self) -> &str {
		&self.description
	}

	/// Record of the exchange that failed.
	pub fn record(&self) -> &ExchangeRecord {
		&self.record
	}

	/// HTTP status of the failed exchange.
	pub fn http_status(&self) -> u16 {
		self.record.http_status()
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
