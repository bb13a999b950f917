//! Async client for the Professionali.ru API - OAuth token lifecycle, signed
//! requests, and transparent refresh-and-retry in one crate.
//!
//! The crate exposes a single orchestrator, [`client::ApiClient`], on top of a
//! pluggable [`transport::ApiTransport`] seam. The client owns the application
//! credentials and the in-memory token state, attaches either the bearer token
//! or a computed [`signature`](signature::sign) to each call, and turns every
//! completed exchange into an immutable [`record::ExchangeRecord`]. Expired
//! tokens refresh proactively; an `invalid_token` response triggers one
//! transparent refresh-and-retry before surfacing as an error.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod client;
pub mod error;
pub mod obs;
pub mod params;
pub mod record;
pub mod signature;
pub mod token;
pub mod transport;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		client::{ApiClient, AppCredentials},
		transport::ReqwestTransport,
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestTransport>;

	/// Builds a client pointed at a mock server origin with fixture
	/// credentials.
	pub fn build_test_client(api_host: Url) -> ReqwestTestClient {
		ApiClient::new(AppCredentials::new("test-app", "test-secret")).with_api_host(api_host)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use http::Method;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
