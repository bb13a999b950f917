//! API client orchestration: token lifecycle, signed fetches, and the
//! refresh-and-retry protocol.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::ApiError,
	obs::{self, CallKind, CallOutcome, CallSpan, RefreshMetrics},
	params::{ACCESS_TOKEN_PARAM, ParamSet, ParamValue, SIGNATURE_PARAM},
	record::ExchangeRecord,
	signature,
	token::{IssuedToken, RefreshedToken, TokenState},
	transport::{ApiTransport, TransportRequest},
};
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;

/// Default API origin.
pub const API_HOST: &str = "https://api.professionali.ru";

/// Browser authorization page.
const AUTHORIZATION_PATH: &str = "/oauth/authorize.html";
/// Code-to-token exchange endpoint.
const GET_TOKEN_PATH: &str = "/oauth/getToken.json";
/// Token refresh endpoint.
const REFRESH_TOKEN_PATH: &str = "/oauth/refreshToken.json";
/// Session termination endpoint.
const LOGOUT_PATH: &str = "/oauth/logout.json";
/// Own-profile endpoint with its fixed query.
const CURRENT_USER_PATH: &str = "/v6/users/get.json?ids[]=me&fields=id,name,link,avatar_big";

/// Code the server reports for a token it wants refreshed.
const INVALID_TOKEN_CODE: &str = "invalid_token";
/// Code the server reports for a token it no longer recognizes.
const UNDEFINED_TOKEN_CODE: &str = "undefined_token";

/// Registered application credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppCredentials {
	application_id: String,
	application_secret: String,
}
impl AppCredentials {
	/// Bundles the application identifier and shared secret.
	pub fn new(application_id: impl Into<String>, application_secret: impl Into<String>) -> Self {
		Self { application_id: application_id.into(), application_secret: application_secret.into() }
	}

	/// Application identifier sent as `client_id`.
	pub fn application_id(&self) -> &str {
		&self.application_id
	}

	pub(crate) fn application_secret(&self) -> &str {
		&self.application_secret
	}
}
impl Debug for AppCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppCredentials")
			.field("application_id", &self.application_id)
			.field("application_secret", &"<redacted>")
			.finish()
	}
}

/// Rendering mode of the authorization page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthDisplay {
	#[default]
	/// Full-page dialog.
	Page,
	/// Pop-up window dialog.
	Popup,
	/// Touch-screen dialog.
	Touch,
	/// WAP dialog.
	Wap,
}
impl AuthDisplay {
	/// Returns the wire value of the `display` parameter.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthDisplay::Page => "page",
			AuthDisplay::Popup => "popup",
			AuthDisplay::Touch => "touch",
			AuthDisplay::Wap => "wap",
		}
	}
}
impl Display for AuthDisplay {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Parameters of one [`ApiClient::fetch`] call.
#[derive(Clone, Debug)]
pub struct FetchRequest {
	url: String,
	parameters: ParamSet,
	method: Method,
	subscribe: bool,
	debug: Option<bool>,
}
impl FetchRequest {
	/// Starts a GET request for the provided URL.
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			parameters: ParamSet::new(),
			method: Method::GET,
			subscribe: false,
			debug: None,
		}
	}

	/// Replaces the parameter set.
	pub fn with_parameters(mut self, parameters: ParamSet) -> Self {
		self.parameters = parameters;

		self
	}

	/// Adds a single parameter.
	pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
		self.parameters.insert(key, value);

		self
	}

	/// Overrides the HTTP method (GET by default).
	pub fn with_method(mut self, method: Method) -> Self {
		self.method = method;

		self
	}

	/// Signs the request instead of attaching the raw token.
	pub fn subscribed(mut self) -> Self {
		self.subscribe = true;

		self
	}

	/// Overrides the client-wide debug flag for this call.
	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = Some(debug);

		self
	}
}

/// Profile row returned by the own-profile endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// User identifier.
	pub id: String,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Profile link.
	#[serde(default)]
	pub link: Option<String>,
	/// Large avatar URL.
	#[serde(default)]
	pub avatar_big: Option<String>,
}

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Coordinates authenticated exchanges against the API host.
///
/// The client owns the transport, the application credentials, and the token
/// state. Token reads and writes (the expiry check, the proactive refresh,
/// and the invalid-token retry) run under one async mutex, so callers sharing
/// a client never race the refresh sequence.
pub struct ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Transport used for every outbound exchange.
	pub transport: Arc<T>,
	/// Application credentials presented to the OAuth endpoints.
	pub credentials: AppCredentials,
	/// Shared metrics recorder for refresh outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	api_host: Url,
	debug: bool,
	token: AsyncMutex<TokenState>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a client that uses the caller-provided transport.
	pub fn with_transport(credentials: AppCredentials, transport: impl Into<Arc<T>>) -> Self {
		Self {
			transport: transport.into(),
			credentials,
			refresh_metrics: Default::default(),
			api_host: default_api_host(),
			debug: false,
			token: AsyncMutex::new(TokenState::new()),
		}
	}

	/// Overrides the API origin (self-hosted gateways, mock servers in
	/// tests). Endpoint paths themselves are fixed.
	pub fn with_api_host(mut self, host: Url) -> Self {
		self.api_host = host;

		self
	}

	/// Sets the client-wide debug default; individual calls can override it
	/// via [`FetchRequest::with_debug`].
	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = debug;

		self
	}

	/// Restores a previously persisted access token and its expiry.
	pub fn with_access_token(
		mut self,
		token: impl Into<String>,
		expires_at: OffsetDateTime,
	) -> Self {
		self.token.get_mut().authorize(token, expires_at);

		self
	}

	/// Snapshot of the current token state.
	pub async fn token_state(&self) -> TokenState {
		self.token.lock().await.clone()
	}

	/// Currently held access token, if any.
	pub async fn current_token(&self) -> Option<String> {
		self.token.lock().await.access_token().map(|secret| secret.expose().to_owned())
	}

	/// Expiry instant of the held token, if any.
	pub async fn token_expiry(&self) -> Option<OffsetDateTime> {
		self.token.lock().await.expires_at()
	}

	/// Builds the browser authorization-page URL.
	pub fn authentication_url(&self, redirect_uri: &str, display: AuthDisplay) -> Result<Url> {
		let mut url = self.endpoint(AUTHORIZATION_PATH)?;

		url.query_pairs_mut()
			.append_pair("response_type", "code")
			.append_pair("client_id", self.credentials.application_id())
			.append_pair("redirect_uri", redirect_uri)
			.append_pair("display", display.as_str());

		Ok(url)
	}

	/// Exchanges an authorization code for an access token.
	///
	/// On success the client transitions to the authenticated state with
	/// `expires_at = now + expires_in` (this endpoint reports a relative
	/// lifetime). The raw exchange record is returned for inspection.
	pub async fn exchange_code_for_token(
		&self,
		code: &str,
		redirect_uri: &str,
	) -> Result<ExchangeRecord> {
		const KIND: CallKind = CallKind::TokenExchange;

		let span = CallSpan::new(KIND, "exchange_code_for_token");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let url = self.endpoint(GET_TOKEN_PATH)?;
				let parameters = [
					("code", code),
					("redirect_uri", redirect_uri),
					("client_id", self.credentials.application_id()),
					("client_secret", self.credentials.application_secret()),
				]
				.into_iter()
				.collect::<ParamSet>();
				let mut token = self.token.lock().await;
				let record = self
					.checked_exchange(&mut token, url, parameters, Method::POST, self.debug)
					.await?;
				let issued_at = OffsetDateTime::now_utc();
				let grant = decode_body::<IssuedToken>(&record)?;
				let expires_at = grant.expires_at(issued_at);

				token.authorize(grant.access_token, expires_at);

				Ok(record)
			})
			.await;

		record_outcome(KIND, &result);

		result
	}

	/// Refreshes the held access token.
	///
	/// The refresh endpoint reports the new expiry as an absolute stamp; see
	/// [`RefreshedToken`].
	pub async fn refresh_access_token(&self) -> Result<ExchangeRecord> {
		const KIND: CallKind = CallKind::Refresh;

		let span = CallSpan::new(KIND, "refresh_access_token");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let mut token = self.token.lock().await;

				self.refresh_locked(&mut token).await
			})
			.await;

		record_outcome(KIND, &result);

		result
	}

	/// Terminates the session.
	///
	/// The token state is cleared even when the server reports a failure; the
	/// failure still surfaces afterwards. Without a held token the call only
	/// clears.
	pub async fn logout(&self) -> Result<()> {
		const KIND: CallKind = CallKind::Logout;

		let span = CallSpan::new(KIND, "logout");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let url = self.endpoint(LOGOUT_PATH)?;
				let mut token = self.token.lock().await;
				let result = match token.access_token().cloned() {
					Some(secret) => {
						let parameters = [(ACCESS_TOKEN_PARAM, secret.expose())]
							.into_iter()
							.collect::<ParamSet>();

						self.checked_exchange(&mut token, url, parameters, Method::GET, self.debug)
							.await
							.map(|_| ())
					},
					None => Ok(()),
				};

				token.clear();

				result
			})
			.await;

		record_outcome(KIND, &result);

		result
	}

	/// Fetches the caller's own profile.
	///
	/// The endpoint answers a single-element collection for a `me` query;
	/// the element is returned directly.
	pub async fn get_current_user(&self) -> Result<UserProfile> {
		const KIND: CallKind = CallKind::CurrentUser;

		let span = CallSpan::new(KIND, "get_current_user");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let url = self.endpoint(CURRENT_USER_PATH)?;
				let record = self.fetch(FetchRequest::new(url.as_str())).await?;
				let users = decode_body::<Vec<UserProfile>>(&record)?;

				users.into_iter().next().ok_or(Error::EmptyCollection)
			})
			.await;

		record_outcome(KIND, &result);

		result
	}

	/// Generic fetch primitive.
	///
	/// Proactively refreshes an expired token before sending, attaches either
	/// the computed signature (subscribed requests) or the raw token, and
	/// retries once through a refresh when the server reports
	/// `invalid_token`.
	pub async fn fetch(&self, request: FetchRequest) -> Result<ExchangeRecord> {
		const KIND: CallKind = CallKind::Fetch;

		let span = CallSpan::new(KIND, "fetch");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		let result = span
			.instrument(async move {
				let FetchRequest { url, mut parameters, method, subscribe, debug } = request;
				let url = Url::parse(&url)?;
				let debug = debug.unwrap_or(self.debug);
				let mut token = self.token.lock().await;

				if token.is_authorized() && token.is_expired() {
					self.refresh_locked(&mut token).await?;
				}
				if subscribe {
					let signed =
						signature::sign(&url, &parameters, self.credentials.application_secret());

					parameters.insert(SIGNATURE_PARAM, signed);
				} else if let Some(secret) = token.access_token() {
					parameters.insert(ACCESS_TOKEN_PARAM, secret.expose());
				}

				self.exchange_with_retry(&mut token, url, parameters, method, debug).await
			})
			.await;

		record_outcome(KIND, &result);

		result
	}

	fn endpoint(&self, path: &str) -> Result<Url> {
		self.api_host.join(path).map_err(Error::from)
	}

	/// One raw exchange, classified but never retried.
	async fn execute_once(
		&self,
		url: &Url,
		parameters: &ParamSet,
		method: &Method,
		debug: bool,
	) -> Result<ExchangeOutcome> {
		if ![Method::GET, Method::POST, Method::PUT, Method::DELETE].contains(method) {
			return Err(Error::UnsupportedMethod { method: method.clone() });
		}

		// URL-embedded query parameters win on key collision.
		let mut merged = parameters.clone();

		merged.merge(ParamSet::from_url(url));

		let (effective_url, form) = if *method == Method::GET {
			let mut rebuilt = url.clone();

			rebuilt.set_query(None);

			if !merged.is_empty() {
				let mut pairs = rebuilt.query_pairs_mut();

				for (key, value) in merged.to_pairs() {
					pairs.append_pair(&key, &value);
				}
			}

			(rebuilt, Vec::new())
		} else {
			(url.clone(), merged.to_pairs())
		};
		let reply = self
			.transport
			.execute(TransportRequest {
				method: method.clone(),
				url: effective_url.clone(),
				form,
				capture_headers: debug,
			})
			.await?;
		let record = ExchangeRecord::new(&effective_url, merged, reply, debug);

		if record.http_status() == 200 {
			return Ok(ExchangeOutcome::Success(record));
		}

		let (code, description) = derive_failure(&record);

		Ok(ExchangeOutcome::Failure { code, description, record })
	}

	/// Exchange with no retry semantics; used by the token endpoints.
	async fn checked_exchange(
		&self,
		token: &mut TokenState,
		url: Url,
		parameters: ParamSet,
		method: Method,
		debug: bool,
	) -> Result<ExchangeRecord> {
		match self.execute_once(&url, &parameters, &method, debug).await? {
			ExchangeOutcome::Success(record) => Ok(record),
			ExchangeOutcome::Failure { code, description, record } =>
				Err(failure_error(token, code, description, record)),
		}
	}

	/// Refresh under the caller-held token lock.
	async fn refresh_locked(&self, token: &mut TokenState) -> Result<ExchangeRecord> {
		self.refresh_metrics.record_attempt();

		let result = self.refresh_inner(token).await;

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		result
	}

	async fn refresh_inner(&self, token: &mut TokenState) -> Result<ExchangeRecord> {
		let current = token.access_token().cloned().ok_or(Error::Unauthenticated)?;
		let url = self.endpoint(REFRESH_TOKEN_PATH)?;
		let parameters =
			[(ACCESS_TOKEN_PARAM, current.expose())].into_iter().collect::<ParamSet>();
		let record =
			self.checked_exchange(token, url, parameters, Method::GET, self.debug).await?;
		let grant = decode_body::<RefreshedToken>(&record)?;
		let expires_at = grant.expires_at()?;

		token.authorize(grant.access_token, expires_at);

		Ok(record)
	}

	/// Exchange with the bounded invalid-token retry protocol.
	async fn exchange_with_retry(
		&self,
		token: &mut TokenState,
		url: Url,
		parameters: ParamSet,
		method: Method,
		debug: bool,
	) -> Result<ExchangeRecord> {
		let mut url = url;
		let mut parameters = parameters;
		let mut refreshed = false;

		loop {
			let (code, description, record) =
				match self.execute_once(&url, &parameters, &method, debug).await? {
					ExchangeOutcome::Success(record) => return Ok(record),
					ExchangeOutcome::Failure { code, description, record } =>
						(code, description, record),
				};

			if code != INVALID_TOKEN_CODE || !token.is_authorized() {
				return Err(failure_error(token, code, description, record));
			}
			if refreshed {
				return Err(Error::RetryExhausted(ApiError::new(code, description, record)));
			}

			refreshed = true;

			self.refresh_locked(token).await?;

			// Substitute the just-refreshed token everywhere the stale one
			// could appear: the parameter set and the URL's own query.
			let fresh = token.access_token().cloned().ok_or(Error::Unauthenticated)?;

			parameters.insert(ACCESS_TOKEN_PARAM, fresh.expose());
			substitute_url_token(&mut url, fresh.expose());
		}
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a client backed by the crate's default reqwest transport.
	pub fn new(credentials: AppCredentials) -> Self {
		Self::with_transport(credentials, ReqwestTransport::default())
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("credentials", &self.credentials)
			.field("api_host", &self.api_host)
			.field("debug", &self.debug)
			.finish()
	}
}

enum ExchangeOutcome {
	Success(ExchangeRecord),
	Failure { code: String, description: String, record: ExchangeRecord },
}

fn default_api_host() -> Url {
	Url::parse(API_HOST).expect("Default API host is a well-formed URL.")
}

fn record_outcome<V>(kind: CallKind, result: &Result<V>) {
	match result {
		Ok(_) => obs::record_call_outcome(kind, CallOutcome::Success),
		Err(_) => obs::record_call_outcome(kind, CallOutcome::Failure),
	}
}

/// Maps a classified failure, clearing the token state on `undefined_token`.
fn failure_error(
	token: &mut TokenState,
	code: String,
	description: String,
	record: ExchangeRecord,
) -> Error {
	if code == UNDEFINED_TOKEN_CODE {
		token.clear();
	}

	ApiError::new(code, description, record).into()
}

/// Derives `(code, description)` from a non-200 record body.
///
/// Recognizes the `{error, description}` and `{code, error}` shapes and falls
/// back to the stringified HTTP status.
fn derive_failure(record: &ExchangeRecord) -> (String, String) {
	if let Some(json) = record.json() {
		if let (Some(code), Some(description)) = (json.get("error"), json.get("description")) {
			return (literal(code), literal(description));
		}
		if let (Some(code), Some(description)) = (json.get("code"), json.get("error")) {
			return (literal(code), literal(description));
		}
	}

	(record.http_status().to_string(), "unknown error".to_owned())
}

/// String form of a JSON scalar without the quoting `Value::to_string` adds.
fn literal(value: &serde_json::Value) -> String {
	match value {
		serde_json::Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}

/// Strict body decoding with a JSON path on mismatch.
fn decode_body<V>(record: &ExchangeRecord) -> Result<V>
where
	V: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_str(record.body());

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::ResponseParse { source })
}

/// Rewrites the `access_token` query value in place when the URL carries one.
fn substitute_url_token(url: &mut Url, fresh: &str) {
	if !url.query_pairs().any(|(key, _)| key == ACCESS_TOKEN_PARAM) {
		return;
	}

	let pairs = url
		.query_pairs()
		.map(|(key, value)| {
			let value =
				if key == ACCESS_TOKEN_PARAM { fresh.to_owned() } else { value.into_owned() };

			(key.into_owned(), value)
		})
		.collect::<Vec<_>>();

	url.set_query(None);
	url.query_pairs_mut().extend_pairs(pairs);
}
