//! Database views for analytical queries.

use ::duckdb::Connection;

/// Create database views backing the read-side helpers.
///
/// - `vw_symbol_coverage`: first/last stored timestamp and row count per symbol
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_symbol_coverage AS
SELECT
    symbol,
    MIN(timestamp) AS first_ts,
    MAX(timestamp) AS last_ts,
    COUNT(*) AS row_count,
    MAX(load_timestamp) AS last_loaded_at
FROM stock_prices
GROUP BY symbol;
",
    )?;

    Ok(())
}
