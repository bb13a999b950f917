#![cfg(feature = "reqwest")]

// crates.io
use http::Method;
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use professionali_api::{
	client::{ApiClient, AppCredentials, FetchRequest},
	error::Error,
	params::ParamSet,
	signature,
	transport::ReqwestTransport,
};

fn build_client(server: &MockServer) -> ApiClient<ReqwestTransport> {
	let host = Url::parse(&server.base_url()).expect("Mock server URL should parse.");

	ApiClient::new(AppCredentials::new("test-app", "test-secret")).with_api_host(host)
}

fn valid_until_tomorrow() -> OffsetDateTime {
	OffsetDateTime::now_utc() + Duration::hours(24)
}

#[tokio::test]
async fn invalid_token_triggers_one_refresh_and_one_retry() {
	let server = MockServer::start_async().await;
	let primary = server
		.mock_async(|when, then| {
			when.method(GET).path("/v6/feed.json").query_param("access_token", "stale-token");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_token\",\"description\":\"Token expired.\"}");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/oauth/refreshToken.json")
				.query_param("access_token", "stale-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"fresh-token\",\"expires_in\":\"2030-01-01T00:00:00Z\"}");
		})
		.await;
	let retried = server
		.mock_async(|when, then| {
			when.method(GET).path("/v6/feed.json").query_param("access_token", "fresh-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"items\":[1,2]}");
		})
		.await;
	let client = build_client(&server).with_access_token("stale-token", valid_until_tomorrow());
	let record = client
		.fetch(FetchRequest::new(server.url("/v6/feed.json")))
		.await
		.expect("Retry after the refresh should succeed.");

	assert_eq!(primary.hits_async().await, 1);
	assert_eq!(refresh.hits_async().await, 1);
	assert_eq!(retried.hits_async().await, 1);
	// The returned record is the retry's, not the original failure's.
	assert_eq!(record.http_status(), 200);
	assert_eq!(record.json(), Some(&serde_json::json!({"items": [1, 2]})));
	assert_eq!(client.current_token().await.as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn persistent_invalid_token_exhausts_the_retry() {
	let server = MockServer::start_async().await;
	let primary = server
		.mock_async(|when, then| {
			when.method(GET).path("/v6/feed.json");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_token\",\"description\":\"Still invalid.\"}");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth/refreshToken.json");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"fresh-token\",\"expires_in\":\"2030-01-01T00:00:00Z\"}");
		})
		.await;
	let client = build_client(&server).with_access_token("stale-token", valid_until_tomorrow());
	let result = client.fetch(FetchRequest::new(server.url("/v6/feed.json"))).await;

	assert!(matches!(result, Err(Error::RetryExhausted(_))));
	assert_eq!(primary.hits_async().await, 2);
	assert_eq!(refresh.hits_async().await, 1);
}

#[tokio::test]
async fn undefined_token_clears_state_and_surfaces() {
	let server = MockServer::start_async().await;
	let primary = server
		.mock_async(|when, then| {
			when.method(GET).path("/v6/feed.json");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"undefined_token\",\"description\":\"No such token.\"}");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.path("/oauth/refreshToken.json");
			then.status(200).body("{}");
		})
		.await;
	let client = build_client(&server).with_access_token("held-token", valid_until_tomorrow());
	let failure = client
		.fetch(FetchRequest::new(server.url("/v6/feed.json")))
		.await
		.expect_err("Undefined token should surface as an error.");

	assert_eq!(failure.code(), "undefined_token");
	assert_eq!(
		failure.record().map(|record| record.http_status()),
		Some(401),
		"The failed exchange should stay inspectable.",
	);
	assert_eq!(primary.hits_async().await, 1);
	assert_eq!(refresh.hits_async().await, 0);
	assert_eq!(client.current_token().await, None);
}

#[tokio::test]
async fn url_query_and_explicit_parameters_merge() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v6/x.json").query_param("a", "1").query_param("b", "2");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let client = build_client(&server);

	client
		.fetch(FetchRequest::new(server.url("/v6/x.json?a=1")).with_parameter("b", 2_i64))
		.await
		.expect("Merged GET should succeed.");

	mock.assert_async().await;
}

#[tokio::test]
async fn unsupported_method_sends_nothing() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.path("/v6/x.json");
			then.status(200).body("{}");
		})
		.await;
	let client = build_client(&server);
	let failure = client
		.fetch(FetchRequest::new(server.url("/v6/x.json")).with_method(Method::PATCH))
		.await
		.expect_err("PATCH should be rejected locally.");

	assert_eq!(failure.code(), "unsupported_method");
	assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn current_user_returns_the_single_element() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v6/users/get.json")
				.query_param("ids[]", "me")
				.query_param("fields", "id,name,link,avatar_big")
				.query_param("access_token", "held-token");
			then.status(200)
				.header("content-type", "application/json")
				.body("[{\"id\":\"42\",\"name\":\"X\"}]");
		})
		.await;
	let client = build_client(&server).with_access_token("held-token", valid_until_tomorrow());
	let profile = client.get_current_user().await.expect("Profile lookup should succeed.");

	mock.assert_async().await;
	assert_eq!(profile.id, "42");
	assert_eq!(profile.name, "X");
	assert_eq!(profile.link, None);
}

#[tokio::test]
async fn subscribed_fetch_carries_the_computed_signature() {
	let server = MockServer::start_async().await;
	let target =
		Url::parse(&server.url("/v6/messages/add.json")).expect("Target URL should parse.");
	let parameters = [("text", "hello")].into_iter().collect::<ParamSet>();
	let expected = signature::sign(&target, &parameters, "test-secret");
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v6/messages/add.json")
				.query_param("text", "hello")
				.query_param("signature", expected.as_str());
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let client = build_client(&server).with_access_token("held-token", valid_until_tomorrow());

	client
		.fetch(
			FetchRequest::new(target.as_str())
				.with_parameters(parameters)
				.subscribed(),
		)
		.await
		.expect("Subscribed fetch should succeed.");

	mock.assert_async().await;
}

#[tokio::test]
async fn post_sends_a_form_encoded_body() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v6/messages/add.json");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let client = build_client(&server);

	client
		.fetch(
			FetchRequest::new(server.url("/v6/messages/add.json"))
				.with_method(Method::POST)
				.with_parameter("text", "hello"),
		)
		.await
		.expect("POST fetch should succeed.");

	mock.assert_async().await;
}

#[tokio::test]
async fn debug_mode_captures_both_header_sets() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/v6/x.json");
			then.status(200).header("content-type", "application/json").body("{\"ok\":true}");
		})
		.await;

	let client = build_client(&server);
	let record = client
		.fetch(FetchRequest::new(server.url("/v6/x.json")).with_debug(true))
		.await
		.expect("Debug fetch should succeed.");

	assert!(!record.request_headers().is_empty());
	assert!(
		record.response_headers()[0].starts_with("HTTP/1.1 200"),
		"Response headers should open with the status line.",
	);
	assert!(record.content_type().starts_with("application/json"));
	assert_eq!(record.json(), Some(&serde_json::json!({"ok": true})));

	let plain = client
		.fetch(FetchRequest::new(server.url("/v6/x.json")))
		.await
		.expect("Plain fetch should succeed.");

	assert!(plain.request_headers().is_empty());
	assert!(plain.response_headers().is_empty());
}
