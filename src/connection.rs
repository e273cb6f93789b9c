//! Connection implementation for ADBC-RTDB driver.
//!
//! The `RtdbConnection` owns the state machine of one native client and
//! exposes it two ways: a row API (`execute`, `query`, `close`) and the ADBC
//! `Connection` trait, which creates statements over the same session.

#![allow(refining_impl_trait)]

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use adbc_core::{Connection, Optionable, options::{InfoCode, OptionConnection, OptionValue}};
use arrow_array::{RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use tracing::{debug, warn};

use crate::adapter::{Adapter, ExecResult, Status};
use crate::context::Context;
use crate::dsn::Config;
use crate::error::{Result, RtdbError};
use crate::format::format_args;
use crate::native::NativeClient;
use crate::reader::VecRecordBatchReader;
use crate::rows::Rows;
use crate::statement::RtdbStatement;
use crate::types::Value;

/// Connection to an RTDB server through the native client.
///
/// Clones share the same session. The connection's own cancellation signal
/// is fired by [`Connection::cancel`] and observed by every operation that
/// is not given an explicit [`Context`].
#[derive(Clone)]
pub struct RtdbConnection {
    adapter: Arc<Adapter>,
    config: Arc<Config>,
    ctx: Context,
}

impl RtdbConnection {
    /// Connects `client` using `config`.
    ///
    /// # Arguments
    /// * `client` - Fresh native client, released if connecting fails
    /// * `config` - Parsed connection configuration
    pub fn connect(client: Box<dyn NativeClient>, config: Config) -> Result<Self> {
        Self::connect_context(&Context::background(), client, config)
    }

    /// Connects `client`, giving up when `ctx` is cancelled or its deadline
    /// (capped by the configured dial timeout) passes.
    pub fn connect_context(ctx: &Context, client: Box<dyn NativeClient>, config: Config) -> Result<Self> {
        let ctx = if config.dial_timeout.is_zero() {
            ctx.clone()
        } else {
            ctx.capped(Instant::now() + config.dial_timeout)
        };
        let conn = Self {
            adapter: Arc::new(Adapter::new(client)),
            config: Arc::new(config),
            ctx: Context::background(),
        };

        let conn_str = conn.config.native_conn_str();
        if let Err(e) = conn.with_context(&ctx, || conn.adapter.connect(&conn_str)) {
            if let Err(close_err) = conn.adapter.close() {
                warn!("Failed to release client after connect failure: {}", close_err);
            }
            return Err(e);
        }
        debug!(
            "Connected to {} as '{}', database '{}'",
            conn.config.address, conn.config.user, conn.config.db_name
        );
        Ok(conn)
    }

    /// Configuration the connection was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.adapter.status()
    }

    /// The connection's own cancellation signal.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Character set reported by the native client.
    pub fn native_charset(&self) -> Result<String> {
        self.adapter.charset()
    }

    /// Runs a statement that returns no rows.
    ///
    /// # Arguments
    /// * `sql` - Query text, with `?` placeholders when `args` is non-empty
    /// * `args` - Positional arguments substituted as SQL literals
    pub fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.execute_context(&self.ctx, sql, args)
    }

    pub fn execute_context(&self, ctx: &Context, sql: &str, args: &[Value]) -> Result<ExecResult> {
        self.adapter.check_usable()?;
        let sql = self.render(sql, args)?;
        self.with_context(ctx, || {
            self.adapter
                .exec(&sql, &self.config.charset, &self.config.db_name)
        })
    }

    /// Runs a query and returns a cursor over its rows.
    ///
    /// A query that produces no result set yields an empty cursor. Running
    /// another query on this connection supersedes the returned cursor.
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        self.query_context(&self.ctx, sql, args)
    }

    pub fn query_context(&self, ctx: &Context, sql: &str, args: &[Value]) -> Result<Rows> {
        self.adapter.check_usable()?;
        let sql = self.render(sql, args)?;
        self.with_context(ctx, || {
            self.adapter
                .run_query(&sql, &self.config.charset, &self.config.db_name)?;
            match self.adapter.fetch_result()? {
                Some(generation) => Rows::new(Arc::clone(&self.adapter), generation),
                None => Ok(Rows::empty()),
            }
        })
    }

    /// Closes the connection and releases the native client. Safe to call
    /// more than once.
    pub fn close(&self) -> Result<()> {
        self.adapter.close()
    }

    /// False once the connection is closed or has observed a cancellation.
    pub fn is_valid(&self) -> bool {
        self.adapter.check_usable().is_ok()
    }

    /// Prepares the connection for reuse by a pool.
    pub fn reset_session(&self) -> Result<()> {
        self.adapter.check_usable()
    }

    /// Transactions are not supported.
    pub fn begin(&self) -> Result<()> {
        Err(RtdbError::unsupported("transactions"))
    }

    /// Prepared statements are not supported.
    pub fn prepare(&self, _sql: &str) -> Result<()> {
        Err(RtdbError::unsupported("prepared statements"))
    }

    /// Substitutes `args` into `sql`. Without arguments the text is sent as is.
    fn render<'a>(&self, sql: &'a str, args: &[Value]) -> Result<Cow<'a, str>> {
        if args.is_empty() {
            return Ok(Cow::Borrowed(sql));
        }
        format_args(sql, args, &self.config.location).map(Cow::Owned)
    }

    /// Runs `f` unless `ctx` is already done, and reports a cancellation
    /// observed once `f` returns. Either way the connection is marked bad.
    fn with_context<T>(&self, ctx: &Context, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(reason) = ctx.err() {
            self.adapter.record_cancel(reason);
            return Err(RtdbError::cancelled(reason));
        }
        let out = f()?;
        if let Some(reason) = ctx.err() {
            self.adapter.record_cancel(reason);
            return Err(RtdbError::cancelled(reason));
        }
        Ok(out)
    }
}

fn not_implemented(what: &str) -> adbc_core::error::Error {
    adbc_core::error::Error::with_message_and_status(
        format!("{} not supported", what),
        adbc_core::error::Status::NotImplemented,
    )
}

impl Optionable for RtdbConnection {
    type Option = OptionConnection;

    fn set_option(&mut self, _key: Self::Option, _value: OptionValue) -> adbc_core::error::Result<()> {
        Err(not_implemented("Connection options"))
    }

    fn get_option_string(&self, _key: Self::Option) -> adbc_core::error::Result<String> {
        Err(not_implemented("Connection options"))
    }

    fn get_option_bytes(&self, _key: Self::Option) -> adbc_core::error::Result<Vec<u8>> {
        Err(not_implemented("Connection options"))
    }

    fn get_option_double(&self, _key: Self::Option) -> adbc_core::error::Result<f64> {
        Err(not_implemented("Connection options"))
    }

    fn get_option_int(&self, _key: Self::Option) -> adbc_core::error::Result<i64> {
        Err(not_implemented("Connection options"))
    }
}

impl Connection for RtdbConnection {
    type StatementType = RtdbStatement;

    fn new_statement(&mut self) -> adbc_core::error::Result<Self::StatementType> {
        self.adapter.check_usable()?;
        Ok(RtdbStatement::new(self.clone()))
    }

    fn cancel(&mut self) -> adbc_core::error::Result<()> {
        self.ctx.cancel();
        Ok(())
    }

    fn get_info(&self, codes: Option<HashSet<InfoCode>>) -> adbc_core::error::Result<VecRecordBatchReader> {
        let info = [
            (InfoCode::VendorName as u32, "RTDB"),
            (InfoCode::DriverName as u32, "ADBC-RTDB"),
            (InfoCode::DriverVersion as u32, env!("CARGO_PKG_VERSION")),
        ];
        let wanted: Option<HashSet<u32>> =
            codes.map(|codes| codes.into_iter().map(|code| code as u32).collect());
        let (info_codes, info_values): (Vec<u32>, Vec<&str>) = info
            .iter()
            .filter(|(code, _)| wanted.as_ref().is_none_or(|wanted| wanted.contains(code)))
            .copied()
            .unzip();

        let schema = Schema::new(vec![
            Field::new("info_code", DataType::UInt32, false),
            Field::new("info_value", DataType::Utf8, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema.clone()),
            vec![
                Arc::new(UInt32Array::from(info_codes)),
                Arc::new(StringArray::from(info_values)),
            ],
        )
        .map_err(|e| adbc_core::error::Error::with_message_and_status(
            format!("Failed to create info batch: {}", e),
            adbc_core::error::Status::Internal,
        ))?;

        Ok(VecRecordBatchReader::new(vec![batch], schema))
    }

    fn get_objects(
        &self,
        _depth: adbc_core::options::ObjectDepth,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _table_type: Option<Vec<&str>>,
        _column_name: Option<&str>,
    ) -> adbc_core::error::Result<Box<dyn arrow_array::RecordBatchReader + Send>> {
        Err(not_implemented("Catalog introspection"))
    }

    fn get_table_schema(
        &self,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: &str,
    ) -> adbc_core::error::Result<Schema> {
        Err(not_implemented("Table schema lookup"))
    }

    fn get_table_types(&self) -> adbc_core::error::Result<VecRecordBatchReader> {
        Err(not_implemented("Table type listing"))
    }

    fn get_statistic_names(&self) -> adbc_core::error::Result<VecRecordBatchReader> {
        let schema = Schema::new(vec![
            Field::new("statistic_name", DataType::Utf8, false),
            Field::new("statistic_key", DataType::Int16, false),
        ]);
        Ok(VecRecordBatchReader::empty(schema))
    }

    fn get_statistics(
        &self,
        _catalog: Option<&str>,
        _db_schema: Option<&str>,
        _table_name: Option<&str>,
        _approximate: bool,
    ) -> adbc_core::error::Result<VecRecordBatchReader> {
        Ok(VecRecordBatchReader::empty(Schema::empty()))
    }

    fn commit(&mut self) -> adbc_core::error::Result<()> {
        Err(not_implemented("Transaction commit"))
    }

    fn rollback(&mut self) -> adbc_core::error::Result<()> {
        Err(not_implemented("Transaction rollback"))
    }

    fn read_partition(&self, _partition: impl AsRef<[u8]>) -> adbc_core::error::Result<Box<dyn arrow_array::RecordBatchReader + Send>> {
        Err(not_implemented("Partitioned reads"))
    }
}
