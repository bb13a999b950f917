//! Transport primitives executing raw exchanges against the API host.
//!
//! [`ApiTransport`] is the client's only seam to an HTTP stack. The client
//! layer builds the final URL and form pairs; the transport performs one
//! exchange and hands back the raw outcome as a [`TransportReply`]. In
//! header-capture mode the reply's payload carries the response header
//! block(s) ahead of the body, separated by a blank line, exactly as a
//! header-echoing HTTP tool emits them; the record layer owns the splitting.

// std
use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::CONTENT_TYPE;
// self
use crate::{_prelude::*, error::TransportError};

/// One outbound exchange handed to a transport.
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// Effective HTTP method.
	pub method: Method,
	/// Fully built request URL (query string included for GET).
	pub url: Url,
	/// Form-encoded body pairs; empty for GET.
	pub form: Vec<(String, String)>,
	/// Capture raw request/response header text.
	pub capture_headers: bool,
}

/// Raw transport output prior to record construction.
#[derive(Clone, Debug, Default)]
pub struct TransportReply {
	/// HTTP status code.
	pub status: u16,
	/// `Content-Type` response header value.
	pub content_type: String,
	/// Response payload: the bare body, or header block(s) plus body when
	/// headers were captured.
	pub payload: String,
	/// Raw outbound header text, when captured.
	pub request_headers: Option<String>,
}

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportReply, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing API exchanges.
///
/// Implementations must follow redirects and verify TLS certificate chains;
/// the client layer relies on both and never re-checks them.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Performs one HTTP exchange.
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_>;
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one
/// place. The stock client follows redirects and verifies TLS, matching the
/// transport contract; configure any custom [`ReqwestClient`] to keep both.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: TransportRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client.request(request.method.clone(), request.url.clone());

			if !request.form.is_empty() {
				builder = builder.form(&request.form);
			}

			let prepared = builder.build().map_err(TransportError::from)?;
			let request_headers =
				request.capture_headers.then(|| format_request_headers(&prepared));
			let response = client.execute(prepared).await.map_err(TransportError::from)?;
			let status = response.status();
			let content_type = response
				.headers()
				.get(CONTENT_TYPE)
				.and_then(|value| value.to_str().ok())
				.unwrap_or_default()
				.to_owned();
			let header_block = request.capture_headers.then(|| format_response_headers(&response));
			let body = response.text().await.map_err(TransportError::from)?;
			let payload = match header_block {
				Some(block) => format!("{block}\n\n{body}"),
				None => body,
			};

			Ok(TransportReply { status: status.as_u16(), content_type, payload, request_headers })
		})
	}
}

#[cfg(feature = "reqwest")]
fn format_request_headers(request: &reqwest::Request) -> String {
	let url = request.url();
	let query = url.query().map(|query| format!("?{query}")).unwrap_or_default();
	let mut text = format!(
		"{} {}{} HTTP/1.1\r\nHost: {}\r\n",
		request.method(),
		url.path(),
		query,
		url.host_str().unwrap_or_default(),
	);

	for (name, value) in request.headers() {
		text.push_str(&format!("{name}: {}\r\n", value.to_str().unwrap_or("<opaque>")));
	}

	text
}

#[cfg(feature = "reqwest")]
fn format_response_headers(response: &reqwest::Response) -> String {
	let status = response.status();
	let mut text = format!(
		"HTTP/1.1 {} {}",
		status.as_u16(),
		status.canonical_reason().unwrap_or("Unknown"),
	);

	for (name, value) in response.headers() {
		text.push_str(&format!("\r\n{name}: {}", value.to_str().unwrap_or("<opaque>")));
	}

	text
}
