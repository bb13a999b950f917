//! Walks through the authorization flow end to end: print the consent URL,
//! exchange the pasted code for a token, then fetch the caller's own profile.
//!
//! Requires `PRO_APP_ID` and `PRO_APP_SECRET` in the environment.

// std
use std::{
	env,
	io::{self, BufRead, Write},
};
// crates.io
use color_eyre::Result;
// self
use professionali_api::client::{ApiClient, AppCredentials, AuthDisplay};

const REDIRECT_URI: &str = "https://app.example.com/oauth/callback";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let credentials = AppCredentials::new(env::var("PRO_APP_ID")?, env::var("PRO_APP_SECRET")?);
	let client = ApiClient::new(credentials);
	let consent = client.authentication_url(REDIRECT_URI, AuthDisplay::Page)?;

	println!("Open {consent} in a browser and approve access.");
	print!("Paste the `code` query parameter from the redirect: ");
	io::stdout().flush()?;

	let mut code = String::new();

	io::stdin().lock().read_line(&mut code)?;

	let record = client.exchange_code_for_token(code.trim(), REDIRECT_URI).await?;

	println!("Token endpoint answered with HTTP {}.", record.http_status());

	if let Some(expiry) = client.token_expiry().await {
		println!("Access token expires at {expiry}; snapshot client.token_state() to persist it.");
	}

	let profile = client.get_current_user().await?;

	println!("Authenticated as {} (id {}).", profile.name, profile.id);

	Ok(())
}
