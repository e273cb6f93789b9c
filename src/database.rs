//! Database implementation for ADBC-RTDB driver.
//!
//! The `RtdbDatabase` holds the DSN and credential overrides, and creates
//! connections through a client factory that produces fresh native clients.

use std::fmt;
use std::sync::Arc;

use adbc_core::{Database, Optionable, options::{OptionConnection, OptionDatabase, OptionValue}};
use tracing::debug;

use crate::connection::RtdbConnection;
use crate::dsn::{Config, parse_dsn};
use crate::error::Result;
use crate::native::NativeClient;

/// Produces a fresh native client for each new connection.
pub type ClientFactory = Arc<dyn Fn(&Config) -> Result<Box<dyn NativeClient>> + Send + Sync>;

/// Factory backed by the native client library.
#[cfg(feature = "ffi")]
pub fn native_client_factory() -> ClientFactory {
    Arc::new(|_config: &Config| -> Result<Box<dyn NativeClient>> {
        let client = crate::native::ffi::FfiClient::new()?;
        Ok(Box::new(client) as Box<dyn NativeClient>)
    })
}

/// Without the `ffi` feature there is no native library to connect through.
#[cfg(not(feature = "ffi"))]
pub fn native_client_factory() -> ClientFactory {
    Arc::new(|_config: &Config| -> Result<Box<dyn NativeClient>> {
        Err(crate::error::RtdbError::unsupported(
            "native client library not linked; build with the `ffi` feature",
        ))
    })
}

/// Database configuration holder.
///
/// Stores the DSN and optional credential overrides, and opens connections
/// with clients from its [`ClientFactory`].
pub struct RtdbDatabase {
    /// RTDB DSN, `user:password@protocol(host:port)/dbname?params`
    pub uri: String,
    /// Username overriding the one in the DSN
    pub user: Option<String>,
    /// Password overriding the one in the DSN
    pub password: Option<String>,
    factory: ClientFactory,
}

impl Default for RtdbDatabase {
    fn default() -> Self {
        Self {
            uri: String::new(),
            user: None,
            password: None,
            factory: native_client_factory(),
        }
    }
}

impl fmt::Debug for RtdbDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtdbDatabase")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl RtdbDatabase {
    /// Replaces the factory used to create native clients.
    pub fn with_client_factory(mut self, factory: ClientFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Parses the DSN and applies the credential overrides.
    pub fn config(&self) -> Result<Config> {
        let mut config = parse_dsn(&self.uri)?;
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        Ok(config)
    }

    /// Opens a connection using the row API types directly.
    pub fn connect(&self) -> Result<RtdbConnection> {
        let config = self.config()?;
        let client = (self.factory)(&config)?;
        debug!("Opening connection to {}", config.address);
        RtdbConnection::connect(client, config)
    }
}

fn unsupported_option() -> adbc_core::error::Error {
    adbc_core::error::Error::with_message_and_status(
        "Unsupported database option",
        adbc_core::error::Status::NotImplemented,
    )
}

impl Optionable for RtdbDatabase {
    type Option = OptionDatabase;

    fn set_option(&mut self, key: Self::Option, value: OptionValue) -> adbc_core::error::Result<()> {
        let value = match value {
            OptionValue::String(value) => value,
            _ => {
                return Err(adbc_core::error::Error::with_message_and_status(
                    "Expected string value for database option",
                    adbc_core::error::Status::InvalidArguments,
                ));
            }
        };
        match key {
            OptionDatabase::Uri => self.uri = value,
            OptionDatabase::Username => self.user = Some(value),
            OptionDatabase::Password => self.password = Some(value),
            _ => return Err(unsupported_option()),
        }
        Ok(())
    }

    fn get_option_string(&self, key: Self::Option) -> adbc_core::error::Result<String> {
        let value = match key {
            OptionDatabase::Uri => Some(&self.uri),
            OptionDatabase::Username => self.user.as_ref(),
            OptionDatabase::Password => self.password.as_ref(),
            _ => return Err(unsupported_option()),
        };
        value.cloned().ok_or_else(|| {
            adbc_core::error::Error::with_message_and_status(
                "Database option not set",
                adbc_core::error::Status::NotFound,
            )
        })
    }

    fn get_option_bytes(&self, _key: Self::Option) -> adbc_core::error::Result<Vec<u8>> {
        Err(unsupported_option())
    }

    fn get_option_double(&self, _key: Self::Option) -> adbc_core::error::Result<f64> {
        Err(unsupported_option())
    }

    fn get_option_int(&self, _key: Self::Option) -> adbc_core::error::Result<i64> {
        Err(unsupported_option())
    }
}

impl Database for RtdbDatabase {
    type ConnectionType = RtdbConnection;

    fn new_connection(&self) -> adbc_core::error::Result<Self::ConnectionType> {
        self.new_connection_with_opts(std::iter::empty())
    }

    fn new_connection_with_opts(
        &self,
        opts: impl IntoIterator<Item = (OptionConnection, OptionValue)>,
    ) -> adbc_core::error::Result<Self::ConnectionType> {
        if let Some((key, _)) = opts.into_iter().next() {
            return Err(adbc_core::error::Error::with_message_and_status(
                format!("Connection option {:?} not supported", key),
                adbc_core::error::Status::NotImplemented,
            ));
        }
        Ok(self.connect()?)
    }
}
