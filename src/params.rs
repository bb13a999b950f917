//! Request parameter model shared by the client, signer, and record layers.
//!
//! The API encodes repeated and grouped parameters with bracket keys
//! (`ids[]=me`, `filter[city]=spb`), so a parameter value is either a scalar
//! or a nested group of further values. [`ParamSet`] keeps keys sorted
//! bytewise ascending, which makes every derived encoding (query strings,
//! form bodies, signature material) deterministic regardless of insertion
//! order.

// self
use crate::_prelude::*;

/// Wire name of the bearer-token parameter.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";
/// Wire name of the request-signature parameter.
pub const SIGNATURE_PARAM: &str = "signature";

/// Single request parameter value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
	/// Plain string value.
	Scalar(String),
	/// Positional group encoded as repeated `key[]` entries.
	List(Vec<ParamValue>),
	/// Named group encoded as `key[sub]` entries.
	Map(BTreeMap<String, ParamValue>),
}
impl From<String> for ParamValue {
	fn from(value: String) -> Self {
		Self::Scalar(value)
	}
}
impl From<&str> for ParamValue {
	fn from(value: &str) -> Self {
		Self::Scalar(value.to_owned())
	}
}
impl From<i64> for ParamValue {
	fn from(value: i64) -> Self {
		Self::Scalar(value.to_string())
	}
}
impl From<u64> for ParamValue {
	fn from(value: u64) -> Self {
		Self::Scalar(value.to_string())
	}
}
impl From<Vec<String>> for ParamValue {
	fn from(values: Vec<String>) -> Self {
		Self::List(values.into_iter().map(Self::Scalar).collect())
	}
}
impl From<Vec<&str>> for ParamValue {
	fn from(values: Vec<&str>) -> Self {
		Self::List(values.into_iter().map(Self::from).collect())
	}
}

/// Order-canonical parameter mapping.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ParamSet(BTreeMap<String, ParamValue>);
impl ParamSet {
	/// Empty parameter set.
	pub fn new() -> Self {
		Self::default()
	}

	/// `true` when no parameters are held.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Number of top-level parameters.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Inserts a parameter, replacing any previous value under the same key.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
		self.0.insert(key.into(), value.into());
	}

	/// Removes a parameter, returning the previous value if one was held.
	pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
		self.0.remove(key)
	}

	/// Looks up a parameter by key.
	pub fn get(&self, key: &str) -> Option<&ParamValue> {
		self.0.get(key)
	}

	/// `true` when a parameter is held under `key`.
	pub fn contains(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	/// Keys in ascending bytewise order.
	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	/// Values in ascending key order.
	pub fn values(&self) -> impl Iterator<Item = &ParamValue> {
		self.0.values()
	}

	/// Absorbs `other`, overwriting this set's entries on key collision.
	pub fn merge(&mut self, other: ParamSet) {
		self.0.extend(other.0);
	}

	/// Expands the set into flat `(key, value)` pairs with bracket keys, in
	/// ascending key order.
	pub fn to_pairs(&self) -> Vec<(String, String)> {
		let mut pairs = Vec::new();

		for (key, value) in &self.0 {
			expand(key, value, &mut pairs);
		}

		pairs
	}

	/// Reads a URL's query string into a set, decoding bracket keys.
	pub fn from_url(url: &Url) -> Self {
		let mut set = Self::new();

		for (key, value) in url.query_pairs() {
			set.insert_wire(&key, value.into_owned());
		}

		set
	}

	/// Inserts one decoded `key=value` pair, interpreting bracket keys.
	///
	/// A repeated plain key keeps the last value, matching the server's own
	/// query-string semantics; `key[]` accumulates into a positional group and
	/// `key[sub]` into a named group.
	pub(crate) fn insert_wire(&mut self, wire_key: &str, value: String) {
		if let Some((name, rest)) = wire_key.split_once('[')
			&& let Some(sub) = rest.strip_suffix(']')
			&& !sub.contains(['[', ']'])
			&& !name.is_empty()
		{
			if sub.is_empty() {
				let slot = self
					.0
					.entry(name.to_owned())
					.or_insert_with(|| ParamValue::List(Vec::new()));

				match slot {
					ParamValue::List(items) => items.push(ParamValue::Scalar(value)),
					other => *other = ParamValue::List(vec![ParamValue::Scalar(value)]),
				}
			} else {
				let slot = self
					.0
					.entry(name.to_owned())
					.or_insert_with(|| ParamValue::Map(BTreeMap::new()));

				match slot {
					ParamValue::Map(entries) => {
						entries.insert(sub.to_owned(), ParamValue::Scalar(value));
					},
					other => {
						let mut entries = BTreeMap::new();

						entries.insert(sub.to_owned(), ParamValue::Scalar(value));

						*other = ParamValue::Map(entries);
					},
				}
			}

			return;
		}

		self.0.insert(wire_key.to_owned(), ParamValue::Scalar(value));
	}
}
impl<K, V> FromIterator<(K, V)> for ParamSet
where
	K: Into<String>,
	V: Into<ParamValue>,
{
	fn from_iter<I>(entries: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
	{
		Self(entries.into_iter().map(|(key, value)| (key.into(), value.into())).collect())
	}
}

fn expand(prefix: &str, value: &ParamValue, pairs: &mut Vec<(String, String)>) {
	match value {
		ParamValue::Scalar(text) => pairs.push((prefix.to_owned(), text.clone())),
		ParamValue::List(items) =>
			for item in items {
				expand(&format!("{prefix}[]"), item, pairs);
			},
		ParamValue::Map(entries) =>
			for (sub, item) in entries {
				expand(&format!("{prefix}[{sub}]"), item, pairs);
			},
	}
}
