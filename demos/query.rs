//! Query example for ADBC-RTDB driver.
//!
//! Connects with the DSN built from environment variables, runs a query with
//! the row API, then reads the same query as Arrow batches through ADBC.
//! Set `RUST_LOG=adbc_rtdb=debug` to see the SQL sent to the server.

use adbc_core::{Connection, Database, Driver, Statement, options::OptionDatabase};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let host = std::env::var("RTDB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("RTDB_PORT").unwrap_or_else(|_| "9000".to_string());
    let user = std::env::var("RTDB_USER").unwrap_or_else(|_| "root".to_string());
    let password = std::env::var("RTDB_PASSWORD").unwrap_or_default();
    let db_name = std::env::var("RTDB_DATABASE").unwrap_or_else(|_| "test".to_string());
    let dsn = format!("{}:{}@tcp({}:{})/{}?charset=utf-8", user, password, host, port, db_name);

    println!("Connecting to RTDB at {}:{}", host, port);

    // Row API
    let conn = adbc_rtdb::open(&dsn)?;
    let mut rows = conn.query("SELECT name, value FROM sensors WHERE value > ?", &[20.0f64.into()])?;
    println!("Columns: {:?}", rows.columns());
    loop {
        match rows.next_row() {
            Ok(row) => println!("  {:?}", row),
            Err(e) if e.is_end_of_data() => break,
            Err(e) => return Err(e.into()),
        }
    }
    conn.close()?;

    // ADBC API
    let mut driver = adbc_rtdb::RtdbDriver::default();
    let db = driver.new_database_with_opts([(OptionDatabase::Uri, dsn.into())])?;
    let mut connection = db.new_connection()?;
    let mut stmt = connection.new_statement()?;
    stmt.set_sql_query("SELECT name, value FROM sensors")?;
    for batch in stmt.execute()? {
        let batch = batch?;
        println!("Got {} rows", batch.num_rows());
    }
    connection.close()?;

    Ok(())
}
