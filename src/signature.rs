//! Deterministic signing of privileged API calls.
//!
//! The server recomputes the digest bit-for-bit, so the canonicalization here
//! must never change shape: sorted keys concatenated, values concatenated in
//! the same order with nested groups flattened depth-first, the query-stripped
//! URL components appended, then a double MD5 with the application secret.
//! Volatile keys (`access_token`, `signature`) never contribute, so a signed
//! request stays valid across token rotations.

// crates.io
use md5::{Digest, Md5};
// self
use crate::{
	_prelude::*,
	params::{ACCESS_TOKEN_PARAM, ParamSet, ParamValue, SIGNATURE_PARAM},
};

/// Computes the request signature for `url` and its parameter set.
///
/// Parameters already embedded in the URL's query string take part as well;
/// on key collision the explicit set wins. Two parameter sets that differ
/// only in insertion order produce identical signatures.
pub fn sign(url: &Url, parameters: &ParamSet, application_secret: &str) -> String {
	let mut merged = ParamSet::from_url(url);

	merged.merge(parameters.clone());
	merged.remove(ACCESS_TOKEN_PARAM);
	merged.remove(SIGNATURE_PARAM);

	let mut base = String::new();

	for key in merged.keys() {
		base.push_str(key);
	}

	// Values contribute depth-first: a group's members are pushed back onto
	// the front of the queue, and only leaf values reach the hash.
	let mut queue = merged.values().collect::<VecDeque<_>>();

	while let Some(value) = queue.pop_front() {
		match value {
			ParamValue::Scalar(text) => base.push_str(text),
			ParamValue::List(items) =>
				for item in items.iter().rev() {
					queue.push_front(item);
				},
			ParamValue::Map(entries) =>
				for item in entries.values().rev() {
					queue.push_front(item);
				},
		}
	}

	base.push_str(&component_hash(url));

	let inner = hex::encode(Md5::digest(base.as_bytes()));

	hex::encode(Md5::digest(format!("{inner}{application_secret}").as_bytes()))
}

// The query-stripped URL contributes its component values ordered by
// component name: fragment, host, pass, path, port, scheme, user. Absent
// components contribute nothing.
fn component_hash(url: &Url) -> String {
	let mut components = BTreeMap::new();

	if let Some(fragment) = url.fragment() {
		components.insert("fragment", fragment.to_owned());
	}
	if let Some(host) = url.host_str() {
		components.insert("host", host.to_owned());
	}
	if let Some(pass) = url.password() {
		components.insert("pass", pass.to_owned());
	}

	components.insert("path", url.path().to_owned());

	if let Some(port) = url.port() {
		components.insert("port", port.to_string());
	}

	components.insert("scheme", url.scheme().to_owned());

	if !url.username().is_empty() {
		components.insert("user", url.username().to_owned());
	}

	components.into_values().collect()
}
