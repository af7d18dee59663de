#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mongo::Mongo;

use record_hub::auth::config::DemoConfig;
use record_hub::auth::demo_auth::DemoIdentityProvider;
use record_hub::auth::models::{AccessToken, IdentityProvider};
use record_hub::db::memory::InMemoryRecordStore;
use record_hub::db::repository::{MongoRecordStore, RecordStore};
use record_hub::models::schema::RecordSchema;
use record_hub::records::service::RecordService;
use record_hub::state::{build_router, AppState};

pub const COLLECTIONS: &[&str] = &["record_one", "record_two"];

/// Wires the real router to the demo identity provider and one store per
/// collection.
///
/// For Mongo-backed environments the container is kept alive for as long
/// as this struct lives.
pub struct TestEnv {
    _mongo: Option<ContainerAsync<Mongo>>,
    pub router: Router,
    pub identity: Arc<dyn IdentityProvider>,
    pub stores: Vec<Arc<dyn RecordStore>>,
    pub mongo_db: Option<mongodb::Database>,
}

impl TestEnv {
    /// In-memory stores; no container needed.
    pub fn in_memory() -> Self {
        let stores = COLLECTIONS
            .iter()
            .map(|name| Arc::new(InMemoryRecordStore::new(name)) as Arc<dyn RecordStore>)
            .collect();
        Self::build(None, None, stores)
    }

    /// Spin up MongoDB and back every collection with it.
    pub async fn start() -> Self {
        let mongo_container = Mongo::default()
            .start()
            .await
            .expect("Failed to start MongoDB container");
        let mongo_port = mongo_container
            .get_host_port_ipv4(27017)
            .await
            .expect("Failed to get MongoDB port");
        let mongo_uri = format!("mongodb://127.0.0.1:{}", mongo_port);
        let mongo_client = mongodb::Client::with_uri_str(&mongo_uri)
            .await
            .expect("Failed to connect to MongoDB");
        let mongo_db = mongo_client.database("record_hub_test");

        let stores = COLLECTIONS
            .iter()
            .map(|name| Arc::new(MongoRecordStore::new(&mongo_db, name)) as Arc<dyn RecordStore>)
            .collect();
        Self::build(Some(mongo_container), Some(mongo_db), stores)
    }

    fn build(
        mongo: Option<ContainerAsync<Mongo>>,
        mongo_db: Option<mongodb::Database>,
        stores: Vec<Arc<dyn RecordStore>>,
    ) -> Self {
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(DemoIdentityProvider::new(&demo_config()));

        let services = COLLECTIONS
            .iter()
            .zip(stores.iter())
            .map(|(name, store)| {
                Arc::new(RecordService::new(
                    name,
                    name,
                    RecordSchema::default(),
                    store.clone(),
                ))
            })
            .collect();

        let router = build_router(AppState::new(identity.clone(), services));

        Self {
            _mongo: mongo,
            router,
            identity,
            stores,
            mongo_db,
        }
    }

    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .expect_success_by_default()
            .build(self.router.clone())
    }

    /// A `TestServer` that does NOT expect success by default (for error tests).
    pub fn server_permissive(&self) -> axum_test::TestServer {
        axum_test::TestServer::builder()
            .build(self.router.clone())
    }

    /// Helper: obtain a bearer token through `POST /token`.
    pub async fn token(&self, server: &axum_test::TestServer, username: &str) -> String {
        server
            .post("/token")
            .form(&[("username", username), ("password", username)])
            .await
            .json::<AccessToken>()
            .access_token
    }

    /// Helper: create a record via the API and return its id.
    pub async fn create(
        &self,
        server: &axum_test::TestServer,
        collection: &str,
        token: &str,
        body: serde_json::Value,
    ) -> String {
        let response = server
            .post(&format!("/{collection}"))
            .authorization_bearer(token)
            .json(&body)
            .await;
        response.json::<serde_json::Value>()["id"]
            .as_str()
            .expect("created record has an id")
            .to_string()
    }
}

/// Demo users matching the multi-user test flows.
pub fn demo_config() -> DemoConfig {
    let mut config = DemoConfig::default();
    config.users = ["test_user_1", "test_user_2", "test_user_3"]
        .into_iter()
        .map(|name| record_hub::auth::config::DemoUser {
            username: name.to_string(),
            password: name.to_string(),
        })
        .collect();
    config
}

/// Ids of a JSON array of records, in response order.
pub fn ids(records: &serde_json::Value) -> Vec<String> {
    records
        .as_array()
        .expect("expected a JSON array")
        .iter()
        .map(|r| r["id"].as_str().unwrap_or_default().to_string())
        .collect()
}
