//! Batch layer - multi-row exec and typed queries.
//!
//! Built purely on the public [`Driver`] operations; every method prepares
//! one statement and finalizes it on every path before returning.
//!
//! ```text
//! exec:   prepare ─► [bind × cols ─► step ─► reset ─► changes] × rows ─► finalize
//! query:  prepare ─► bind × params ─► (step ─► column × cols)* ─► finalize
//! ```
//!
//! No implicit transaction is opened; wrap the calls in `BEGIN`/`COMMIT`
//! through [`Driver::exec_one`] when atomicity is needed.

use thiserror::Error;

use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::value::{Row, Value, ValueType};

/// Failure of [`Driver::exec`], with the progress made before it.
#[derive(Debug, Error)]
#[error(
    "exec failed{} after {affected} changed rows: {source}",
    .row.map_or_else(String::new, |r| format!(" at row {}", r))
)]
pub struct ExecError {
    /// Row being executed when the failure happened; `None` if it happened
    /// before the first row or while finalizing.
    pub row: Option<usize>,
    /// Changed rows summed over the rows that completed.
    pub affected: i64,
    /// What went wrong.
    #[source]
    pub source: Error,
}

impl ExecError {
    fn before_rows(source: Error) -> Self {
        Self {
            row: None,
            affected: 0,
            source,
        }
    }
}

impl From<ExecError> for Error {
    fn from(e: ExecError) -> Self {
        e.source
    }
}

impl Driver {
    /// Run `sql` once per row of `values`, returning the total change count.
    ///
    /// `values` is row-major: row `r` binds `values[r * col_count + c]` at
    /// position `c + 1`. `col_count` must equal the statement's parameter
    /// count. Execution stops at the first failing row.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let n = db
    ///     .exec(
    ///         "INSERT INTO t (name, rating) VALUES (?, ?)",
    ///         2,
    ///         2,
    ///         &["a".into(), 1.5.into(), "b".into(), Value::Null],
    ///     )
    ///     .await?;
    /// assert_eq!(n, 2);
    /// ```
    pub async fn exec(
        &mut self,
        sql: &str,
        row_count: usize,
        col_count: usize,
        values: &[Value],
    ) -> std::result::Result<i64, ExecError> {
        let expected = row_count.checked_mul(col_count).ok_or_else(|| {
            ExecError::before_rows(Error::BindFailed(format!(
                "{} rows of {} columns overflows",
                row_count, col_count
            )))
        })?;
        if values.len() != expected {
            return Err(ExecError::before_rows(Error::BindFailed(format!(
                "expected {} values ({} rows x {} columns), got {}",
                expected,
                row_count,
                col_count,
                values.len()
            ))));
        }

        self.prepare(sql).await.map_err(ExecError::before_rows)?;

        let mut affected = 0i64;
        let outcome = self
            .exec_rows(row_count, col_count, values, &mut affected)
            .await;
        let finalized = self.finalize().await;

        match (outcome, finalized) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(source)) => Err(ExecError {
                row: None,
                affected,
                source,
            }),
            (Ok(()), Ok(())) => {
                tracing::trace!(rows = row_count, affected, "exec complete");
                Ok(affected)
            }
        }
    }

    async fn exec_rows(
        &mut self,
        row_count: usize,
        col_count: usize,
        values: &[Value],
        affected: &mut i64,
    ) -> std::result::Result<(), ExecError> {
        let parameter_count = self.parameter_count().unwrap_or(0);
        if col_count != parameter_count {
            return Err(ExecError::before_rows(Error::BindFailed(format!(
                "statement takes {} parameters, {} columns given",
                parameter_count, col_count
            ))));
        }

        for row in 0..row_count {
            let done = *affected;
            let failed = |source| ExecError {
                row: Some(row),
                affected: done,
                source,
            };
            let cells = &values[row * col_count..(row + 1) * col_count];
            for (c, value) in cells.iter().enumerate() {
                self.bind(c + 1, value).await.map_err(failed)?;
            }
            self.step().await.map_err(failed)?;
            self.reset().await.map_err(failed)?;
            let changes = self.changes().await.map_err(failed)?;
            *affected += changes;
        }
        Ok(())
    }

    /// Run one parameterless statement, returning its change count.
    pub async fn exec_one(&mut self, sql: &str) -> Result<i64> {
        Ok(self.exec(sql, 1, 0, &[]).await?)
    }

    /// Run a query and collect every row, reading columns per `column_types`.
    ///
    /// # Errors
    ///
    /// - `BindFailed` if `params` doesn't match the parameter count
    /// - `SchemaMismatch` if `column_types` doesn't match the column count
    /// - `ColumnTypeMismatch` if a cell can't be read as its declared type
    pub async fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        column_types: &[ValueType],
    ) -> Result<Vec<Row>> {
        self.prepare(sql).await?;
        let rows = self.query_rows(params, column_types).await;
        let finalized = self.finalize().await;

        let rows = rows?;
        finalized?;
        tracing::trace!(rows = rows.len(), "query complete");
        Ok(rows)
    }

    async fn query_rows(&mut self, params: &[Value], column_types: &[ValueType]) -> Result<Vec<Row>> {
        let parameter_count = self.parameter_count().unwrap_or(0);
        if params.len() != parameter_count {
            return Err(Error::BindFailed(format!(
                "statement takes {} parameters, {} given",
                parameter_count,
                params.len()
            )));
        }
        let column_count = self.column_count().unwrap_or(0);
        if column_types.len() != column_count {
            return Err(Error::SchemaMismatch {
                declared: column_types.len(),
                actual: column_count,
            });
        }

        for (i, value) in params.iter().enumerate() {
            self.bind(i + 1, value).await?;
        }

        let mut rows = Vec::new();
        while self.step().await? {
            let mut values = Vec::with_capacity(column_count);
            for (index, &expected) in column_types.iter().enumerate() {
                values.push(self.column(index, expected).await?);
            }
            rows.push(Row::new(values));
        }
        Ok(rows)
    }
}
