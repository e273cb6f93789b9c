//! Common utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use adbc_core::Optionable;
use adbc_core::options::{OptionDatabase, OptionValue};
use adbc_rtdb::{ClientFactory, Config, Result, RtdbDatabase};
use adbc_rtdb::native::NativeClient;
use adbc_rtdb::native::mock::{CallLog, MockClient, raw_field};
use adbc_rtdb::row::RowBuilder;
use adbc_rtdb::types::FieldType;
use parking_lot::Mutex;

/// Test configuration loaded from environment.
pub struct TestConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl TestConfig {
    /// Loads test configuration from environment variables.
    ///
    /// Falls back to defaults if variables are not set.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            host: std::env::var("RTDB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("RTDB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9000),
            user: std::env::var("RTDB_USER").unwrap_or_else(|_| "root".to_string()),
            password: std::env::var("RTDB_PASSWORD").unwrap_or_default(),
            database: std::env::var("RTDB_DATABASE").unwrap_or_else(|_| "test".to_string()),
        }
    }

    /// Builds the DSN connection string.
    pub fn dsn(&self) -> String {
        format!(
            "{}:{}@tcp({}:{})/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Call logs of every mock client handed out by a [`mock_database`].
pub type ClientLogs = Arc<Mutex<Vec<Arc<CallLog>>>>;

/// Creates a database whose connections use fresh clients from `build`.
pub fn mock_database(
    dsn: &str,
    build: impl Fn() -> MockClient + Send + Sync + 'static,
) -> (RtdbDatabase, ClientLogs) {
    let logs: ClientLogs = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&logs);
    let factory: ClientFactory = Arc::new(move |_config: &Config| -> Result<Box<dyn NativeClient>> {
        let client = build();
        seen.lock().push(client.call_log());
        Ok(Box::new(client))
    });
    let mut db = RtdbDatabase::default().with_client_factory(factory);
    db.set_option(OptionDatabase::Uri, OptionValue::String(dsn.to_string()))
        .expect("Failed to set URI");
    (db, logs)
}

pub const SENSOR_QUERY: &str = "SELECT ts, name, value, ok, raw FROM sensors";

/// 2024-01-02T03:04:05.006Z
pub const SENSOR_EPOCH_MS: i64 = 1_704_164_645_006;

/// Mock client answering [`SENSOR_QUERY`] with three rows.
pub fn sensor_client() -> MockClient {
    MockClient::new().with_result(
        SENSOR_QUERY,
        vec![
            raw_field("ts", FieldType::DateTime, false),
            raw_field("name", FieldType::String, false),
            raw_field("value", FieldType::Float64, true),
            raw_field("ok", FieldType::Bool, true),
            raw_field("raw", FieldType::Binary, true),
        ],
        vec![
            RowBuilder::new()
                .push_i64(SENSOR_EPOCH_MS)
                .push_text("boiler")
                .push_f64(81.5)
                .push_bool(true)
                .push_bytes(&[0xde, 0xad])
                .finish(),
            RowBuilder::new()
                .push_i64(SENSOR_EPOCH_MS + 1_000)
                .push_text("pump")
                .push_null()
                .push_bool(false)
                .push_null()
                .finish(),
            RowBuilder::new()
                .push_i64(SENSOR_EPOCH_MS + 2_000)
                .push_text("valve")
                .push_f64(-3.25)
                .push_null()
                .push_bytes(&[])
                .finish(),
        ],
    )
}

/// Mock client answering `SELECT n FROM counter` with `rows` rows.
pub fn counter_client(rows: i64) -> MockClient {
    MockClient::new().with_result(
        "SELECT n FROM counter",
        vec![raw_field("n", FieldType::Int64, false)],
        (0..rows).map(|n| RowBuilder::new().push_i64(n).finish()).collect(),
    )
}
