//! Immutable record of one completed HTTP exchange.

// self
use crate::{_prelude::*, params::ParamSet, transport::TransportReply};

/// Structured, immutable view of one request/response exchange.
///
/// The status and body are always populated. Header fields are captured only
/// when the exchange ran in debug mode. The decoded JSON body is best-effort:
/// a non-JSON payload leaves it unset instead of failing the exchange.
#[derive(Clone, Debug, Serialize)]
pub struct ExchangeRecord {
	url: String,
	parameters: ParamSet,
	http_status: u16,
	content_type: String,
	request_headers: Vec<String>,
	response_headers: Vec<String>,
	body: String,
	json: Option<serde_json::Value>,
}
impl ExchangeRecord {
	pub(crate) fn new(url: &Url, parameters: ParamSet, reply: TransportReply, debug: bool) -> Self {
		let TransportReply { status, content_type, payload, request_headers } = reply;
		let (request_headers, response_headers, body) = if debug {
			let request_headers =
				request_headers.map(|raw| leading_header_block(&raw)).unwrap_or_default();
			let (response_headers, body) = split_header_blocks(&payload);

			(request_headers, response_headers, body)
		} else {
			(Vec::new(), Vec::new(), payload)
		};
		let json = serde_json::from_str(&body).ok();

		Self {
			url: url.to_string(),
			parameters,
			http_status: status,
			content_type,
			request_headers,
			response_headers,
			body,
			json,
		}
	}

	/// Effective request URL.
	pub fn url(&self) -> &str {
		&self.url
	}

	/// Effective parameter set, URL-embedded parameters included.
	pub fn parameters(&self) -> &ParamSet {
		&self.parameters
	}

	/// HTTP status code of the response.
	pub fn http_status(&self) -> u16 {
		self.http_status
	}

	/// `Content-Type` reported by the server.
	pub fn content_type(&self) -> &str {
		&self.content_type
	}

	/// Raw outbound header lines; empty outside debug mode.
	pub fn request_headers(&self) -> &[String] {
		&self.request_headers
	}

	/// Raw response header lines, all redirect hops concatenated; empty
	/// outside debug mode.
	pub fn response_headers(&self) -> &[String] {
		&self.response_headers
	}

	/// Raw response body.
	pub fn body(&self) -> &str {
		&self.body
	}

	/// Response body decoded as JSON, when it parsed.
	pub fn json(&self) -> Option<&serde_json::Value> {
		self.json.as_ref()
	}

	/// Full-record export for diagnostics and structured logging.
	pub fn to_value(&self) -> serde_json::Value {
		serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
	}
}

/// Lines of the first blank-line-terminated block of raw header text.
fn leading_header_block(raw: &str) -> Vec<String> {
	let normalized = raw.replace("\r\n", "\n");
	let block = normalized.split("\n\n").next().unwrap_or_default();

	block.lines().map(str::to_owned).collect()
}

/// Splits leading `HTTP`-prefixed header block(s) from the body.
///
/// Redirect chains produce one block per hop; every leading block is folded
/// into the header list. The body is preserved verbatim, internal blank lines
/// included.
fn split_header_blocks(payload: &str) -> (Vec<String>, String) {
	let normalized = payload.replace("\r\n", "\n");
	let mut headers = Vec::new();
	let mut rest = normalized.as_str();

	while rest.starts_with("HTTP") {
		match rest.split_once("\n\n") {
			Some((block, tail)) => {
				headers.extend(block.lines().map(str::to_owned));

				rest = tail;
			},
			None => {
				headers.extend(rest.lines().map(str::to_owned));

				rest = "";
			},
		}
	}

	(headers, rest.to_owned())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Fixture URL should parse.")
	}

	fn reply(status: u16, payload: &str) -> TransportReply {
		TransportReply {
			status,
			content_type: "application/json".to_owned(),
			payload: payload.to_owned(),
			request_headers: None,
		}
	}

	#[test]
	fn json_body_round_trips() {
		let record = ExchangeRecord::new(
			&url("https://api.example.com/v6/test.json"),
			ParamSet::new(),
			reply(200, "{\"a\":1}"),
			false,
		);

		assert_eq!(record.http_status(), 200);
		assert_eq!(record.json(), Some(&serde_json::json!({"a": 1})));
		assert_eq!(record.body(), "{\"a\":1}");
	}

	#[test]
	fn non_json_body_is_not_an_error() {
		let record = ExchangeRecord::new(
			&url("https://api.example.com/v6/test.json"),
			ParamSet::new(),
			reply(502, "<html>bad gateway</html>"),
			false,
		);

		assert_eq!(record.json(), None);
		assert_eq!(record.body(), "<html>bad gateway</html>");
	}

	#[test]
	fn debug_mode_splits_redirect_header_chains() {
		let payload = "HTTP/1.1 302 Found\r\nLocation: /next\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"ok\":true}";
		let record = ExchangeRecord::new(
			&url("https://api.example.com/v6/test.json"),
			ParamSet::new(),
			TransportReply {
				status: 200,
				content_type: "application/json".to_owned(),
				payload: payload.to_owned(),
				request_headers: Some("GET /v6/test.json HTTP/1.1\r\nHost: api.example.com".to_owned()),
			},
			true,
		);

		assert_eq!(
			record.response_headers(),
			[
				"HTTP/1.1 302 Found",
				"Location: /next",
				"HTTP/1.1 200 OK",
				"Content-Type: application/json",
			],
		);
		assert_eq!(record.request_headers(), ["GET /v6/test.json HTTP/1.1", "Host: api.example.com"]);
		assert_eq!(record.json(), Some(&serde_json::json!({"ok": true})));
	}

	#[test]
	fn debug_mode_preserves_blank_lines_inside_body() {
		let payload = "HTTP/1.1 200 OK\nContent-Type: text/plain\n\nfirst\n\nsecond";
		let record = ExchangeRecord::new(
			&url("https://api.example.com/v6/test.json"),
			ParamSet::new(),
			reply(200, payload),
			true,
		);

		assert_eq!(record.body(), "first\n\nsecond");
	}

	#[test]
	fn non_debug_mode_skips_header_capture() {
		let record = ExchangeRecord::new(
			&url("https://api.example.com/v6/test.json"),
			ParamSet::new(),
			TransportReply {
				status: 200,
				content_type: "application/json".to_owned(),
				payload: "{}".to_owned(),
				request_headers: Some("GET / HTTP/1.1".to_owned()),
			},
			false,
		);

		assert!(record.request_headers().is_empty());
		assert!(record.response_headers().is_empty());
		assert_eq!(record.content_type(), "application/json");
	}

	#[test]
	fn full_record_export_is_a_map() {
		let record = ExchangeRecord::new(
			&url("https://api.example.com/v6/test.json?a=1"),
			[("a", "1")].into_iter().collect(),
			reply(200, "{}"),
			false,
		);
		let exported = record.to_value();

		assert_eq!(
			exported.get("url").and_then(serde_json::Value::as_str),
			Some("https://api.example.com/v6/test.json?a=1"),
		);
		assert_eq!(
			exported.get("http_status").and_then(serde_json::Value::as_u64),
			Some(200),
		);
		assert_eq!(exported.get("parameters"), Some(&serde_json::json!({"a": "1"})));
	}
}
