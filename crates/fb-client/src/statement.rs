//! Prepared statements.
//!
//! ```text
//! Unprepared --prepare(sql)--> Prepared
//! Prepared --execute(params)--> Prepared (no result set) | CursorOpen (result set)
//! CursorOpen --fetch(n)--> CursorOpen | CursorOpen(after last)
//! CursorOpen --close_cursor()--> Prepared
//! Prepared | CursorOpen --prepare(new sql)--> Prepared (cursor closed first)
//! any --close()--> Closed (terminal)
//! ```
//!
//! Statements returning at most one row (procedure calls, DML with
//! `RETURNING`) execute as singletons: the row comes back with the execute
//! response as [`ExecuteResult::Singleton`] and no cursor is opened.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fb_protocol::info::{self, INFO_END, INFO_SQL_GET_PLAN};
use fb_protocol::message::{FREE_CLOSE, FREE_DROP, FREE_UNPREPARE};
use fb_protocol::{
    BatchCompletion, Capabilities, CancelKind, ExecuteRequest, FetchResponse, FetchStatus,
    FieldDescriptor, ProtocolError, Request, Response, RowData, StatementDescription,
    StatementType, codes,
};
use tokio::time::Instant;

use crate::attachment::{Attachment, Exchange, expect_generic, unexpected};
use crate::blob::BlobConfig;
use crate::error::{BatchError, Error, Result};
use crate::row::{FetchResult, RowValue};
use crate::transaction::Transaction;

/// Size of the response buffer for the execution plan.
const PLAN_INFO_SIZE: u32 = 32 * 1024;

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// SQL `NULL`.
    Null,
    /// A value already encoded by the attachment's datatype coder.
    Value(Bytes),
    /// Content for a blob parameter; written to a new blob before the
    /// statement executes and replaced by its id.
    Blob(Bytes),
}

impl Param {
    /// An encoded value.
    pub fn value(value: impl Into<Bytes>) -> Self {
        Self::Value(value.into())
    }

    /// Blob content.
    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::Blob(content.into())
    }
}

impl From<Option<Bytes>> for Param {
    fn from(value: Option<Bytes>) -> Self {
        value.map_or(Self::Null, Self::Value)
    }
}

/// Statement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Allocated, no statement text.
    Unprepared,
    /// Prepared, no open cursor.
    Prepared,
    /// A cursor is open.
    CursorOpen {
        /// Whether the cursor is exhausted.
        after_last: bool,
    },
    /// Released; terminal.
    Closed,
}

/// Outcome of [`Statement::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteResult {
    /// No rows are produced.
    NoResultSet,
    /// A cursor was opened; read it with [`Statement::fetch`].
    ResultSet,
    /// The single row returned by a singleton statement.
    Singleton(RowValue),
}

impl ExecuteResult {
    /// Whether a cursor was opened.
    #[must_use]
    pub fn has_result_set(&self) -> bool {
        matches!(self, Self::ResultSet)
    }

    /// The singleton row, if any.
    #[must_use]
    pub fn singleton(&self) -> Option<&RowValue> {
        match self {
            Self::Singleton(row) => Some(row),
            _ => None,
        }
    }
}

/// A statement handle on an attachment.
///
/// # Timeouts
///
/// A timeout set with [`Statement::set_timeout`] is armed by each execute
/// when the protocol supports statement timeouts and ignored otherwise. A
/// fetch issued after the deadline fails with [`Error::StatementTimeout`];
/// a fetch in flight when it passes is cancelled on the server. Either way
/// the deadline is disarmed, so the statement stays usable.
pub struct Statement {
    attachment: Attachment,
    handle: u32,
    state: StatementState,
    transaction: Option<Transaction>,
    description: Option<StatementDescription>,
    columns: Arc<[FieldDescriptor]>,
    sql: Option<String>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    batch: Vec<Vec<Param>>,
    affected_rows: Option<u64>,
}

impl Statement {
    pub(crate) fn new(attachment: Attachment, handle: u32) -> Self {
        let timeout = attachment.config().timeouts.statement_timeout;
        Self {
            attachment,
            handle,
            state: StatementState::Unprepared,
            transaction: None,
            description: None,
            columns: Arc::from(Vec::new()),
            sql: None,
            timeout,
            deadline: None,
            batch: Vec::new(),
            affected_rows: None,
        }
    }

    /// Server-assigned handle.
    #[must_use]
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Prepared statement text.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    /// Statement kind, once prepared.
    #[must_use]
    pub fn statement_type(&self) -> Option<StatementType> {
        self.description.as_ref().map(|d| d.statement_type)
    }

    /// Input parameter descriptors; empty before prepare.
    #[must_use]
    pub fn parameter_descriptor(&self) -> &[FieldDescriptor] {
        self.description
            .as_ref()
            .map_or(&[], |d| d.parameters.as_slice())
    }

    /// Output column descriptors; empty before prepare.
    #[must_use]
    pub fn row_descriptor(&self) -> &[FieldDescriptor] {
        &self.columns
    }

    /// Rows affected by the last execute.
    #[must_use]
    pub fn affected_rows(&self) -> Option<u64> {
        self.affected_rows
    }

    /// Items waiting in the batch.
    #[must_use]
    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    /// Configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Set or clear the timeout. Clearing also disarms a running deadline.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
        if timeout.is_none() {
            self.deadline = None;
        }
    }

    /// Prepare `sql` within `transaction`.
    ///
    /// An open cursor is closed first. On failure the statement is left
    /// unprepared.
    pub async fn prepare(&mut self, transaction: &Transaction, sql: &str) -> Result<()> {
        self.ensure_not_closed()?;
        transaction.ensure_active()?;
        if matches!(self.state, StatementState::CursorOpen { .. }) {
            self.close_cursor().await?;
        }

        let mut exchange = self.attachment.lock().await?;
        let result = exchange
            .call(&Request::PrepareStatement {
                transaction: transaction.handle(),
                statement: self.handle,
                dialect: self.attachment.config().dialect,
                sql: sql.to_string(),
            })
            .await;
        drop(exchange);

        let description = match result {
            Ok(response) => StatementDescription::decode(&mut response.data.clone()),
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        let description = match description {
            Ok(description) => description,
            Err(e) => {
                self.reset();
                return Err(e.into());
            }
        };

        tracing::debug!(
            statement = self.handle,
            statement_type = ?description.statement_type,
            parameters = description.parameters.len(),
            fields = description.fields.len(),
            "statement prepared"
        );
        self.columns = Arc::from(description.fields.clone());
        self.description = Some(description);
        self.transaction = Some(transaction.clone());
        self.sql = Some(sql.to_string());
        self.state = StatementState::Prepared;
        self.batch.clear();
        self.affected_rows = None;
        self.deadline = None;
        Ok(())
    }

    /// Execute with `params`.
    pub async fn execute(&mut self, params: &[Param]) -> Result<ExecuteResult> {
        match self.state {
            StatementState::Closed => return Err(Error::state(codes::BAD_STMT_HANDLE)),
            StatementState::Unprepared => return Err(Error::state(codes::UNPREPARED_STMT)),
            StatementState::CursorOpen { .. } => {
                return Err(Error::state(codes::DSQL_CURSOR_OPEN_ERR));
            }
            StatementState::Prepared => {}
        }
        let transaction = self.active_transaction()?;
        let statement_type = self
            .statement_type()
            .ok_or(Error::state(codes::UNPREPARED_STMT))?;

        let parameters = self.bind(&transaction, params).await?;

        let timeout_ms = self.arm_deadline();
        let max_inline_blob_size = if self.attachment.supports(Capabilities::INLINE_BLOBS) {
            self.attachment.config().max_inline_blob_size
        } else {
            0
        };
        let request = ExecuteRequest {
            statement: self.handle,
            transaction: transaction.handle(),
            parameters,
            timeout_ms,
            max_inline_blob_size,
        };

        self.affected_rows = None;
        let mut exchange = self.attachment.lock().await?;
        let result = if statement_type.has_cursor() {
            exchange.call(&Request::Execute(request)).await?;
            self.state = StatementState::CursorOpen { after_last: false };
            ExecuteResult::ResultSet
        } else if !self.columns.is_empty() || statement_type == StatementType::ExecProcedure {
            exchange.send(&Request::Execute2(request)).await?;
            let row = match exchange.read().await? {
                Response::Sql(row) => {
                    exchange.read_generic().await?;
                    row
                }
                other => {
                    // A failing execute answers with the generic response only.
                    exchange.check(expect_generic(other)?)?;
                    None
                }
            };
            self.affected_rows = Some(u64::from(row.is_some()));
            match row {
                Some(row) => ExecuteResult::Singleton(RowValue::new(row, Arc::clone(&self.columns))),
                None => ExecuteResult::NoResultSet,
            }
        } else {
            let response = exchange.call(&Request::Execute(request)).await?;
            self.affected_rows = Some(affected_count(&response.data));
            ExecuteResult::NoResultSet
        };
        drop(exchange);

        tracing::debug!(
            statement = self.handle,
            result_set = result.has_result_set(),
            affected = ?self.affected_rows,
            "statement executed"
        );
        Ok(result)
    }

    /// Fetch up to `count` rows in one round trip.
    ///
    /// The server may return fewer rows, or none, without the cursor being
    /// exhausted. Once `after_last` is reported further fetches return no
    /// rows without a round trip.
    pub async fn fetch(&mut self, count: u32) -> Result<FetchResult> {
        let after_last = match self.state {
            StatementState::CursorOpen { after_last } => after_last,
            StatementState::Closed => return Err(Error::state(codes::BAD_STMT_HANDLE)),
            _ => return Err(Error::state(codes::DSQL_CURSOR_ERR)),
        };
        if after_last {
            return Ok(FetchResult {
                rows: Vec::new(),
                after_last: true,
            });
        }
        let transaction = self.active_transaction()?;

        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.deadline = None;
            tracing::debug!(statement = self.handle, "statement timeout expired before fetch");
            return Err(Error::StatementTimeout);
        }

        let count = if count == 0 {
            self.attachment.config().fetch_size
        } else {
            count
        };

        let mut exchange = self.attachment.lock().await?;
        exchange
            .send(&Request::Fetch {
                statement: self.handle,
                count,
            })
            .await?;

        let response = match self.deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, read_fetch(&mut exchange, &transaction))
                    .await
                {
                    Ok(response) => response?,
                    Err(_) => {
                        self.deadline = None;
                        self.cancel_in_flight(&mut exchange).await?;
                        return Err(Error::StatementTimeout);
                    }
                }
            }
            None => read_fetch(&mut exchange, &transaction).await?,
        };
        drop(exchange);

        let after_last = response.status == FetchStatus::Eof;
        let rows: Vec<RowValue> = response
            .rows
            .into_iter()
            .map(|row| RowValue::new(row, Arc::clone(&self.columns)))
            .collect();
        self.state = StatementState::CursorOpen { after_last };
        tracing::debug!(
            statement = self.handle,
            rows = rows.len(),
            after_last = after_last,
            "rows fetched"
        );
        Ok(FetchResult { rows, after_last })
    }

    /// Fetch with the configured fetch size.
    pub async fn fetch_next(&mut self) -> Result<FetchResult> {
        let count = self.attachment.config().fetch_size;
        self.fetch(count).await
    }

    /// Fetch every remaining row.
    pub async fn fetch_all(&mut self) -> Result<Vec<RowValue>> {
        let mut rows = Vec::new();
        loop {
            let batch = self.fetch_next().await?;
            rows.extend(batch.rows);
            if batch.after_last {
                return Ok(rows);
            }
        }
    }

    /// Close the open cursor. Does nothing without one.
    pub async fn close_cursor(&mut self) -> Result<()> {
        if !matches!(self.state, StatementState::CursorOpen { .. }) {
            return Ok(());
        }
        self.free(FREE_CLOSE).await?;
        self.state = StatementState::Prepared;
        self.deadline = None;
        tracing::debug!(statement = self.handle, "cursor closed");
        Ok(())
    }

    /// Discard the prepared statement text, keeping the handle.
    pub async fn unprepare(&mut self) -> Result<()> {
        self.ensure_not_closed()?;
        if self.state == StatementState::Unprepared {
            return Ok(());
        }
        self.close_cursor().await?;
        self.free(FREE_UNPREPARE).await?;
        self.reset();
        Ok(())
    }

    /// Release the statement. Closing twice does nothing.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == StatementState::Closed {
            return Ok(());
        }
        let result = if self.attachment.is_attached() {
            self.free(FREE_DROP).await
        } else {
            Ok(())
        };
        self.reset();
        self.state = StatementState::Closed;
        tracing::debug!(statement = self.handle, "statement closed");
        result
    }

    /// Name the cursor for positioned updates.
    pub async fn set_cursor_name(&mut self, name: &str) -> Result<()> {
        self.ensure_prepared()?;
        let mut exchange = self.attachment.lock().await?;
        exchange
            .call(&Request::SetCursor {
                statement: self.handle,
                name: name.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Query statement information; returns the raw info clumplets.
    pub async fn sql_info(&self, items: &[u8], max_length: u32) -> Result<Bytes> {
        self.ensure_prepared()?;
        let mut exchange = self.attachment.lock().await?;
        let response = exchange
            .call(&Request::InfoSql {
                statement: self.handle,
                items: Bytes::copy_from_slice(items),
                buffer_length: max_length,
            })
            .await?;
        Ok(response.data)
    }

    /// Execution plan reported by the server.
    pub async fn execution_plan(&self) -> Result<String> {
        let data = self
            .sql_info(&[INFO_SQL_GET_PLAN, INFO_END], PLAN_INFO_SIZE)
            .await?;
        let items = info::parse_info(&data)?;
        let plan = info::find_item(&items, INFO_SQL_GET_PLAN)
            .ok_or(ProtocolError::InvalidField("execution plan"))?;
        Ok(plan.as_string().trim().to_string())
    }

    /// Queue a parameter set for [`Statement::execute_batch`].
    pub fn add_to_batch(&mut self, params: &[Param]) -> Result<()> {
        self.ensure_prepared()?;
        self.check_parameter_count(params.len())?;
        self.batch.push(params.to_vec());
        Ok(())
    }

    /// Drop queued parameter sets.
    pub fn clear_batch(&mut self) {
        self.batch.clear();
    }

    /// Execute the queued parameter sets in order; returns the affected
    /// rows of each.
    ///
    /// Execution stops at the first failing item with [`Error::Batch`],
    /// which carries the counts of the items before it. Later items are
    /// not executed. The queue is emptied either way.
    pub async fn execute_batch(&mut self) -> Result<Vec<u64>> {
        match self.state {
            StatementState::Prepared => {}
            StatementState::CursorOpen { .. } => {
                return Err(Error::state(codes::DSQL_CURSOR_OPEN_ERR));
            }
            StatementState::Closed => return Err(Error::state(codes::BAD_STMT_HANDLE)),
            StatementState::Unprepared => return Err(Error::state(codes::UNPREPARED_STMT)),
        }
        if self.statement_type().is_some_and(StatementType::has_cursor) {
            return Err(Error::Unsupported("batch execution of statements with a result set"));
        }
        let items = std::mem::take(&mut self.batch);
        if items.is_empty() {
            return Ok(Vec::new());
        }

        if self.attachment.supports(Capabilities::BATCH_EXECUTION) {
            self.execute_server_batch(items).await
        } else {
            self.execute_each(items).await
        }
    }

    async fn execute_each(&mut self, items: Vec<Vec<Param>>) -> Result<Vec<u64>> {
        let mut completed = Vec::with_capacity(items.len());
        for (index, params) in items.iter().enumerate() {
            match self.execute(params).await {
                Ok(_) => completed.push(self.affected_rows.unwrap_or(0)),
                Err(source) => {
                    tracing::debug!(statement = self.handle, failed_index = index, "batch stopped");
                    return Err(Error::Batch(Box::new(BatchError {
                        completed,
                        failed_index: index,
                        source,
                    })));
                }
            }
        }
        Ok(completed)
    }

    async fn execute_server_batch(&mut self, items: Vec<Vec<Param>>) -> Result<Vec<u64>> {
        let transaction = self.active_transaction()?;
        let mut rows = Vec::with_capacity(items.len());
        for (index, params) in items.iter().enumerate() {
            match self.bind(&transaction, params).await {
                Ok(row) => rows.push(row.unwrap_or_default()),
                Err(source) => {
                    return Err(Error::Batch(Box::new(BatchError {
                        completed: Vec::new(),
                        failed_index: index,
                        source,
                    })));
                }
            }
        }

        let deferred = self.attachment.supports(Capabilities::DEFERRED_PACKETS);
        let mut exchange = self.attachment.lock().await?;
        exchange
            .call(&Request::BatchCreate {
                statement: self.handle,
                buffer_size: 0,
            })
            .await?;
        let outcome = run_server_batch(&mut exchange, self.handle, transaction.handle(), rows).await;
        let release = Request::BatchRelease {
            statement: self.handle,
        };
        if deferred {
            exchange.send_deferred(&release).await?;
        } else {
            exchange.call(&release).await?;
        }
        drop(exchange);

        let completion = outcome?;
        match completion.errors.iter().min_by_key(|(index, _)| *index) {
            Some((index, status)) => {
                let failed_index = *index as usize;
                let completed = completion
                    .counts
                    .iter()
                    .take(failed_index)
                    .map(|count| (*count).max(0) as u64)
                    .collect();
                tracing::debug!(statement = self.handle, failed_index = failed_index, "batch stopped");
                Err(Error::Batch(Box::new(BatchError {
                    completed,
                    failed_index,
                    source: Error::from_status(status.clone()),
                })))
            }
            None => Ok(completion
                .counts
                .iter()
                .map(|count| (*count).max(0) as u64)
                .collect()),
        }
    }

    /// Encode parameters, writing blob contents first.
    async fn bind(&self, transaction: &Transaction, params: &[Param]) -> Result<Option<RowData>> {
        self.check_parameter_count(params.len())?;
        if params.is_empty() {
            return Ok(None);
        }
        let mut fields = Vec::with_capacity(params.len());
        for param in params {
            fields.push(match param {
                Param::Null => None,
                Param::Value(value) => Some(value.clone()),
                Param::Blob(content) => {
                    let id = self
                        .attachment
                        .write_blob(transaction, content, BlobConfig::default())
                        .await?;
                    Some(self.attachment.coder().encode_i64(id.value() as i64))
                }
            });
        }
        Ok(Some(RowData::new(fields)))
    }

    /// Arm the deadline; returns the timeout to send to the server.
    fn arm_deadline(&mut self) -> u32 {
        self.deadline = None;
        let Some(timeout) = self.timeout else {
            return 0;
        };
        if !self.attachment.supports(Capabilities::STATEMENT_TIMEOUT) {
            tracing::debug!(statement = self.handle, "statement timeout not supported, ignored");
            return 0;
        }
        self.deadline = Some(Instant::now() + timeout);
        u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
    }

    async fn cancel_in_flight(&self, exchange: &mut Exchange<'_>) -> Result<()> {
        tracing::debug!(statement = self.handle, "statement timeout expired during fetch");
        if !self.attachment.supports(Capabilities::CANCEL_OPERATION) {
            // Without cancellation the response is still owed; wait for it.
            drain_fetch(exchange).await;
            return Ok(());
        }
        if let Some(cancel) = self.attachment.cancel_handle()
            && let Err(e) = cancel.cancel(CancelKind::Raise).await
        {
            tracing::warn!(error = %e, "cancel request failed");
        }
        drain_fetch(exchange).await;
        Ok(())
    }

    async fn free(&mut self, option: u32) -> Result<()> {
        let request = Request::FreeStatement {
            statement: self.handle,
            option,
        };
        let mut exchange = self.attachment.lock().await?;
        if self.attachment.supports(Capabilities::DEFERRED_PACKETS) {
            exchange.send_deferred(&request).await
        } else {
            exchange.call(&request).await.map(|_| ())
        }
    }

    fn reset(&mut self) {
        self.state = StatementState::Unprepared;
        self.description = None;
        self.columns = Arc::from(Vec::new());
        self.sql = None;
        self.batch.clear();
        self.deadline = None;
    }

    fn active_transaction(&self) -> Result<Transaction> {
        let transaction = self
            .transaction
            .clone()
            .ok_or(Error::state(codes::BAD_TRANS_HANDLE))?;
        transaction.ensure_active()?;
        Ok(transaction)
    }

    fn check_parameter_count(&self, actual: usize) -> Result<()> {
        let expected = self.parameter_descriptor().len();
        if expected != actual {
            return Err(Error::InvalidParameterCount { expected, actual });
        }
        Ok(())
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.state == StatementState::Closed {
            return Err(Error::state(codes::BAD_STMT_HANDLE));
        }
        Ok(())
    }

    fn ensure_prepared(&self) -> Result<()> {
        match self.state {
            StatementState::Closed => Err(Error::state(codes::BAD_STMT_HANDLE)),
            StatementState::Unprepared => Err(Error::state(codes::UNPREPARED_STMT)),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("statement_type", &self.statement_type())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Read the answer to `op_fetch`, caching inline blobs sent ahead of it.
///
/// Cancel safe: dropping the future loses no response.
async fn read_fetch(exchange: &mut Exchange<'_>, transaction: &Transaction) -> Result<FetchResponse> {
    loop {
        match exchange.read().await? {
            Response::InlineBlob(blob) => transaction.cache_inline_blob(blob),
            Response::Fetch(response) => return Ok(response),
            Response::Generic(response) => {
                exchange.check(response)?;
                return Err(Error::Protocol(ProtocolError::UnexpectedOperation {
                    expected: "op_fetch_response",
                    actual: fb_protocol::Operation::Response.code(),
                }));
            }
            other => return Err(unexpected("op_fetch_response", &other)),
        }
    }
}

/// Consume the rest of a cancelled fetch.
async fn drain_fetch(exchange: &mut Exchange<'_>) {
    loop {
        match exchange.read().await {
            Ok(Response::Fetch(_)) | Ok(Response::Generic(_)) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "draining cancelled fetch failed");
                return;
            }
        }
    }
}

async fn run_server_batch(
    exchange: &mut Exchange<'_>,
    statement: u32,
    transaction: u32,
    rows: Vec<RowData>,
) -> Result<BatchCompletion> {
    exchange
        .call(&Request::BatchMsg { statement, rows })
        .await?;
    exchange
        .send(&Request::BatchExec {
            statement,
            transaction,
        })
        .await?;
    match exchange.read().await? {
        Response::BatchCompletion(completion) => Ok(completion),
        other => {
            exchange.check(expect_generic(other)?)?;
            Err(Error::Protocol(ProtocolError::UnexpectedOperation {
                expected: "op_batch_cs",
                actual: fb_protocol::Operation::Response.code(),
            }))
        }
    }
}

/// Affected row count carried in an execute response.
fn affected_count(data: &[u8]) -> u64 {
    match <[u8; 8]>::try_from(data) {
        Ok(raw) => i64::from_be_bytes(raw).max(0) as u64,
        Err(_) => 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_affected_count() {
        assert_eq!(affected_count(&5i64.to_be_bytes()), 5);
        assert_eq!(affected_count(&[]), 0);
        assert_eq!(affected_count(&(-1i64).to_be_bytes()), 0);
    }

    #[test]
    fn test_param_from_option() {
        assert_eq!(Param::from(None), Param::Null);
        assert_eq!(
            Param::from(Some(Bytes::from_static(b"x"))),
            Param::value(Bytes::from_static(b"x"))
        );
    }

    #[test]
    fn test_execute_result_accessors() {
        assert!(ExecuteResult::ResultSet.has_result_set());
        assert!(ExecuteResult::NoResultSet.singleton().is_none());
    }
}
