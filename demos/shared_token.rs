//! Runs two broker instances against one file-backed token table and a mock token endpoint,
//! showing that concurrent requests across both instances trigger a single credential exchange.

// std
use std::{collections::HashMap, sync::Arc};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use token_broker::{
	broker::Broker,
	config::BrokerSettings,
	store::{FileStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/services/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(100))
				.body("{\"access_token\":\"demo-shared-token\"}");
		})
		.await;
	let vars = HashMap::from([
		("APP_ID", "billing".to_owned()),
		("ENV", "demo".to_owned()),
		("SF_TOKEN_URL", server.url("/services/oauth2/token")),
		("SF_CLIENT_ID", "demo-client".to_owned()),
		("SF_CLIENT_SECRET", "demo-secret".to_owned()),
		("SF_USERNAME", "integration@example.com".to_owned()),
		("SF_PASSWORD", "demo-password".to_owned()),
	]);
	let settings = BrokerSettings::from_lookup(|name| vars.get(name).cloned())?;
	let dir = std::env::temp_dir().join(format!("token-broker-demo-{}", std::process::id()));
	let store: Arc<dyn TokenStore> = Arc::new(FileStore::open_table(&dir, &settings.table)?);
	let first = Broker::from_settings(settings.clone(), store.clone())?;
	let second = Broker::from_settings(settings, store)?;
	let (a, b) = tokio::join!(first.handle(), second.handle());

	println!("Instance A answered {} with {:?}.", a.status, a.body);
	println!("Instance B answered {} with {:?}.", b.status, b.body);

	token_mock.assert_calls_async(1).await;
	std::fs::remove_dir_all(&dir)?;

	Ok(())
}
