use crate::error::{ReportError, ReportResult};
use crate::query::period::PeriodFilter;
use crate::storage::records::{self, KeyedStatRow};
use duckdb::Connection;
use std::io;

/// Header row of the keyed-statistics export.
pub const CSV_HEADER: [&str; 4] = ["Period", "Statistic", "Key", "Value"];

/// Export keyed statistics as CSV, ordered by `(period, statistic, key)`.
///
/// The header is written even when there are no rows.
pub fn export_csv(conn: &Connection, filter: PeriodFilter) -> ReportResult<Vec<u8>> {
    let rows = records::keyed_stat_rows(conn, None, filter)?;
    tracing::info!(period = ?filter.code(), rows = rows.len(), "Exporting keyed statistics");
    let mut buf = Vec::with_capacity(rows.len() * 48);
    write_csv(&rows, &mut buf)?;
    Ok(buf)
}

/// Write rows as CSV with the export header.
pub fn write_csv<W: io::Write>(rows: &[KeyedStatRow], writer: W) -> ReportResult<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Parse an export back into rows. The header must match [`CSV_HEADER`].
pub fn read_csv<R: io::Read>(reader: R) -> ReportResult<Vec<KeyedStatRow>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?;
    if headers.iter().ne(CSV_HEADER) {
        return Err(ReportError::Csv(csv::Error::from(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected CSV header: {headers:?}"),
        ))));
    }
    let rows = rdr
        .deserialize()
        .collect::<Result<Vec<KeyedStatRow>, _>>()?;
    Ok(rows)
}
