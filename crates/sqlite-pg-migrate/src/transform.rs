//! Raw-row to typed-record transformation.
//!
//! One malformed legacy row must not abort migration of an entire table:
//! each coercion failure is logged with the table name, the offending row,
//! and the reason, then the row is dropped and the batch continues.

use crate::error::Result;
use crate::records::Record;
use crate::source::RowBatches;
use crate::value::RawRow;
use std::marker::PhantomData;
use tracing::error;

/// Lazy adapter over a table's raw batch sequence, yielding one typed batch
/// per input batch (possibly with fewer records).
pub struct TypedBatches<R: Record> {
    batches: RowBatches,
    _record: PhantomData<R>,
}

impl<R: Record> TypedBatches<R> {
    pub fn new(batches: RowBatches) -> Self {
        Self {
            batches,
            _record: PhantomData,
        }
    }

    /// Next typed batch, or `None` once the table is exhausted.
    ///
    /// Row-level coercion failures never surface here; only source read
    /// errors do.
    pub async fn next_batch(&mut self) -> Option<Result<Vec<R>>> {
        match self.batches.next_batch().await? {
            Ok(rows) => Some(Ok(transform_batch(&rows))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Construct typed records from one raw batch, dropping rows that fail
/// validation.
pub fn transform_batch<R: Record>(rows: &[RawRow]) -> Vec<R> {
    let mut records = Vec::with_capacity(rows.len());

    for row in rows {
        match R::from_row(row) {
            Ok(record) => records.push(record),
            Err(reason) => {
                error!(
                    table = R::TABLE,
                    row = ?row,
                    %reason,
                    "dropping row that failed validation"
                );
            }
        }
    }

    records
}
