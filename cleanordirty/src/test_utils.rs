//! Test doubles and fixtures shared by the unit and integration tests.

use crate::config::{Config, DatabaseConfig, PoolSettings};
use crate::minter::{CodeMinter, MintError};
use crate::{AppState, build_router};
use async_trait::async_trait;
use axum_test::TestServer;
use sqlx::PgPool;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use url::Url;

pub fn public_url() -> Url {
    "http://dishwashers.test".parse().unwrap()
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_url: public_url(),
        database: DatabaseConfig {
            // Unused: tests hand in a pool from #[sqlx::test]
            url: "postgres://unused".to_string(),
            pool: PoolSettings {
                max_connections: 2,
                min_connections: 0,
                ..Default::default()
            },
        },
        ..Default::default()
    }
}

/// Full router over `pool`, minting codes with `minter`.
pub fn create_test_server(pool: PgPool, minter: Arc<dyn CodeMinter>) -> TestServer {
    let state = AppState::builder().db(pool).config(create_test_config()).minter(minter).build();
    let router = build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Hands out a fixed sequence of codes and records the URLs it was asked for.
pub struct StaticMinter {
    codes: Mutex<VecDeque<String>>,
    requested: Mutex<Vec<Url>>,
}

impl StaticMinter {
    pub fn new<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            codes: Mutex::new(codes.into_iter().map(str::to_string).collect()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_urls(&self) -> Vec<Url> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeMinter for StaticMinter {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn mint(&self, long_url: &Url) -> Result<String, MintError> {
        self.requested.lock().unwrap().push(long_url.clone());
        self.codes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| MintError::MalformedResponse("static minter ran out of codes".to_string()))
    }
}

/// Fails every call with a status error.
pub struct FailingMinter {
    status: u16,
    body: String,
}

impl FailingMinter {
    /// Only [`MintError::Status`] can be replayed; anything else fails as a 503.
    pub fn new(error: MintError) -> Self {
        match error {
            MintError::Status { status, body } => Self { status, body },
            other => Self {
                status: 503,
                body: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl CodeMinter for FailingMinter {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn mint(&self, _long_url: &Url) -> Result<String, MintError> {
        Err(MintError::Status {
            status: self.status,
            body: self.body.clone(),
        })
    }
}
