//! Driver entry points: the ADBC `Driver` and the row API's `open`.

use adbc_core::{Driver, Optionable, error::Result, options::OptionValue};

use super::connection::RtdbConnection;
use super::database::{RtdbDatabase, native_client_factory};
use super::dsn::parse_dsn;

#[derive(Default)]
pub struct RtdbDriver {}

impl Driver for RtdbDriver {
    type DatabaseType = RtdbDatabase;

    fn new_database(&mut self) -> Result<Self::DatabaseType> {
        Ok(Self::DatabaseType::default())
    }

    fn new_database_with_opts(
        &mut self,
        opts: impl IntoIterator<Item = (<Self::DatabaseType as Optionable>::Option, OptionValue)>,
    ) -> Result<Self::DatabaseType> {
        let mut database = Self::DatabaseType::default();
        for (key, value) in opts {
            database.set_option(key, value)?;
        }
        Ok(database)
    }
}

/// Parses `dsn` and connects through the native client library.
///
/// # Example
/// ```ignore
/// let conn = adbc_rtdb::open("root:secret@tcp(127.0.0.1:9000)/plant?charset=utf-8")?;
/// let mut rows = conn.query("select name from sensors where site = ?", &["north".into()])?;
/// ```
pub fn open(dsn: &str) -> crate::error::Result<RtdbConnection> {
    let config = parse_dsn(dsn)?;
    let client = native_client_factory()(&config)?;
    RtdbConnection::connect(client, config)
}
