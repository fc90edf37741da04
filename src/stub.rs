//! Stub builders: a matching chain paired with a canned response.
//!
//! `select()` starts a read stub, `insert()`/`update()`/`delete()` start
//! write stubs. Chain-extension methods tighten the match and raise the
//! chain's priority; terminal methods attach the response. A stub
//! registered without a response still matches, and dispatch then
//! reports `Unresolved` to flag the builder misuse.
use crate::*;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Starts a stub matching SELECT queries. Without further filters it
/// matches every SELECT.
pub fn select() -> Stub {
    Stub {
        chain: Chain(vec![Cond::Select { cols: vec![] }]),
        hooks: Vec::new(),
        response: ReadResponse::Pending,
    }
}

/// Starts a write stub matching INSERT statements.
pub fn insert() -> ExecStub {
    ExecStub::new(Cond::Insert { cols: vec![] })
}

/// Starts a write stub matching UPDATE statements.
pub fn update() -> ExecStub {
    ExecStub::new(Cond::Update { cols: vec![] })
}

/// Starts a write stub matching DELETE statements.
pub fn delete() -> ExecStub {
    ExecStub::new(Cond::Delete)
}

/// Side effects that fire once after a stub is confirmed as the selected
/// match, never during chain evaluation.
#[derive(Debug, Clone)]
pub(crate) enum Hook {
    Notify(UnboundedSender<()>),
    Dump,
}

impl Hook {
    fn run(&self, input: &Input) {
        match self {
            // fire-and-forget: a test that never reads the channel must
            // not stall dispatch, and a dropped receiver is not an error
            Hook::Notify(tx) => {
                let _ = tx.send(());
            }
            Hook::Dump => input.dump(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ReadResponse {
    Pending,
    Rows(Vec<Vec<Value>>),
    Tabular(String),
    Error(Arc<dyn std::error::Error + Send + Sync>),
}

/// A read stub: condition chain plus canned row data or an error.
#[derive(Debug, Clone)]
pub struct Stub {
    pub(crate) chain: Chain,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) response: ReadResponse,
}

impl Stub {
    /// Filters on the exact projected column list (order-sensitive,
    /// case-insensitive).
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        if let Some(Cond::Select { cols: slot }) = self.chain.0.first_mut() {
            *slot = cols.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Appends a table to the FROM-list filter; call once per table of
    /// the expected FROM/JOIN list.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        match self.chain.0.iter_mut().find_map(|c| match c {
            Cond::From { tables } => Some(tables),
            _ => None,
        }) {
            Some(tables) => tables.push(table),
            None => self.chain.push(Cond::From { tables: vec![table] }),
        }
        self
    }

    /// Filters on a WHERE comparison against `col`.
    pub fn where_eq(self, col: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_in(col, [value])
    }

    /// Filters on a WHERE entry for `col` with a value list; an IN list
    /// must match in full, a single comparison matches the first value.
    pub fn where_in(
        mut self,
        col: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.chain.push(Cond::Where {
            col: col.into().to_lowercase(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Like [`Stub::where_in`] but also pinned to an operator (`=`,
    /// `>`, `IN`, ...), distinguishing e.g. `=` from `IN` on the same
    /// column.
    pub fn where_op(
        mut self,
        col: impl Into<String>,
        op: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.chain.push(Cond::WhereOp {
            col: col.into().to_lowercase(),
            op: op.into().to_lowercase(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Filters on the exact bound-argument vector.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.chain.push(Cond::Args {
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds a flat priority bias without any matching, for manual
    /// tie-breaking.
    pub fn priority(mut self, p: i32) -> Self {
        self.chain.push(Cond::Priority(p));
        self
    }

    /// Sends on `tx` when this stub is the selected match, exactly once
    /// per dispatch.
    pub fn notify(mut self, tx: UnboundedSender<()>) -> Self {
        self.hooks.push(Hook::Notify(tx));
        self
    }

    /// Logs a diagnostic rendering of the matched input.
    pub fn dump(mut self) -> Self {
        self.hooks.push(Hook::Dump);
        self
    }

    /// Responds with literal row data; columns come from the matching
    /// query itself.
    pub fn rows(
        mut self,
        data: impl IntoIterator<Item = impl IntoIterator<Item = impl Into<Value>>>,
    ) -> Self {
        self.response = ReadResponse::Rows(
            data.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        );
        self
    }

    /// Responds with deferred tabular text, decoded against the matching
    /// query's own columns on first dispatch and frozen afterwards.
    pub fn csv(mut self, text: impl Into<String>) -> Self {
        self.response = ReadResponse::Tabular(text.into());
        self
    }

    /// Responds with an error, returned verbatim instead of any data.
    pub fn error(mut self, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.response = ReadResponse::Error(Arc::new(err));
        self
    }

    pub(crate) fn matches(&self, input: &Input) -> bool {
        self.chain.matches(input)
    }

    pub(crate) fn run_hooks(&self, input: &Input) {
        for hook in &self.hooks {
            hook.run(input);
        }
    }

    /// Materializes the response for a matched input. Deferred tabular
    /// text resolves exactly once; the produced data is kept for the
    /// rest of the stub's registered lifetime.
    pub(crate) fn resolve(&mut self, input: &Input) -> Result<Rows> {
        if let ReadResponse::Tabular(text) = &self.response {
            let data = decode_tabular(input.columns(), text);
            self.response = ReadResponse::Rows(data);
        }
        match &self.response {
            ReadResponse::Error(err) => Err(Error::Stubbed(err.clone())),
            ReadResponse::Pending => Err(Error::Unresolved),
            ReadResponse::Rows(data) => Ok(Rows::new(input.columns().to_vec(), data.clone())),
            ReadResponse::Tabular(_) => unreachable!("tabular data resolved above"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ExecResponse {
    Pending,
    Result(ExecResult),
    Error(Arc<dyn std::error::Error + Send + Sync>),
}

/// Canned result of a write dispatch. Either field may be left unset,
/// in which case reading it errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    last_insert_id: Option<i64>,
    rows_affected: Option<i64>,
}

impl ExecResult {
    pub fn last_insert_id(&self) -> Result<i64> {
        self.last_insert_id.ok_or(Error::NoLastInsertId)
    }

    pub fn rows_affected(&self) -> Result<i64> {
        self.rows_affected.ok_or(Error::NoRowsAffected)
    }
}

/// A write stub (INSERT, UPDATE, DELETE): condition chain plus a canned
/// write result or an error.
#[derive(Debug, Clone)]
pub struct ExecStub {
    pub(crate) chain: Chain,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) response: ExecResponse,
}

impl ExecStub {
    fn new(kind: Cond) -> Self {
        Self {
            chain: Chain(vec![kind]),
            hooks: Vec::new(),
            response: ExecResponse::Pending,
        }
    }

    /// Filters on the exact column list: the INSERT column list or the
    /// UPDATE SET targets. Ignored for DELETE stubs.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        match self.chain.0.first_mut() {
            Some(Cond::Insert { cols: slot } | Cond::Update { cols: slot }) => {
                *slot = cols.into_iter().map(Into::into).collect();
            }
            _ => debug!("column filter ignored for this statement kind"),
        }
        self
    }

    /// Filters on the statement's target table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.chain.push(Cond::Table {
            table: table.into(),
        });
        self
    }

    /// Alias for [`ExecStub::table`] reading naturally for INSERT.
    pub fn into_table(self, table: impl Into<String>) -> Self {
        self.table(table)
    }

    /// Alias for [`ExecStub::table`] reading naturally for DELETE.
    pub fn from_table(self, table: impl Into<String>) -> Self {
        self.table(table)
    }

    /// Filters on a supplied value: the first VALUES row of an INSERT,
    /// or the SET clause of an UPDATE.
    pub fn value(self, col: impl Into<String>, value: impl Into<Value>) -> Self {
        self.value_at(0, col, value)
    }

    /// Filters on a value in the given VALUES row of an INSERT.
    pub fn value_at(mut self, row: usize, col: impl Into<String>, value: impl Into<Value>) -> Self {
        self.chain.push(Cond::Cell {
            row,
            col: col.into().to_lowercase(),
            value: value.into(),
        });
        self
    }

    /// Filters on a WHERE comparison against `col`.
    pub fn where_eq(self, col: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_in(col, [value])
    }

    /// Filters on a WHERE entry for `col` with a value list.
    pub fn where_in(
        mut self,
        col: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.chain.push(Cond::Where {
            col: col.into().to_lowercase(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Like [`ExecStub::where_in`] but pinned to an operator.
    pub fn where_op(
        mut self,
        col: impl Into<String>,
        op: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Value>>,
    ) -> Self {
        self.chain.push(Cond::WhereOp {
            col: col.into().to_lowercase(),
            op: op.into().to_lowercase(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Filters on the exact bound-argument vector.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.chain.push(Cond::Args {
            args: args.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Adds a flat priority bias without any matching.
    pub fn priority(mut self, p: i32) -> Self {
        self.chain.push(Cond::Priority(p));
        self
    }

    /// Sends on `tx` when this stub is the selected match.
    pub fn notify(mut self, tx: UnboundedSender<()>) -> Self {
        self.hooks.push(Hook::Notify(tx));
        self
    }

    /// Logs a diagnostic rendering of the matched input.
    pub fn dump(mut self) -> Self {
        self.hooks.push(Hook::Dump);
        self
    }

    /// Responds with a write result. Pass `None` to leave a field unset
    /// so that reading it errors.
    pub fn result(
        mut self,
        last_insert_id: impl Into<Option<i64>>,
        rows_affected: impl Into<Option<i64>>,
    ) -> Self {
        self.response = ExecResponse::Result(ExecResult {
            last_insert_id: last_insert_id.into(),
            rows_affected: rows_affected.into(),
        });
        self
    }

    /// Shorthand for a result carrying only the affected-row count.
    pub fn rows_affected(self, rows_affected: i64) -> Self {
        self.result(None, rows_affected)
    }

    /// Responds with an error, returned verbatim.
    pub fn error(mut self, err: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.response = ExecResponse::Error(Arc::new(err));
        self
    }

    pub(crate) fn matches(&self, input: &Input) -> bool {
        self.chain.matches(input)
    }

    pub(crate) fn run_hooks(&self, input: &Input) {
        for hook in &self.hooks {
            hook.run(input);
        }
    }

    pub(crate) fn resolve(&self) -> Result<ExecResult> {
        match &self.response {
            ExecResponse::Error(err) => Err(Error::Stubbed(err.clone())),
            ExecResponse::Pending => Err(Error::Unresolved),
            ExecResponse::Result(result) => Ok(*result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chains_accumulate_priority() {
        let bare = select();
        assert_eq!(bare.chain.priority(), 1);
        let filtered = select()
            .columns(["id", "name"])
            .from("beer")
            .where_eq("pct", 5);
        assert_eq!(filtered.chain.priority(), 2 + 1 + 1);
        let op = select().where_op("pct", "IN", [5.4, 10.2]);
        assert_eq!(op.chain.priority(), 1 + 2);
        let biased = update().priority(10);
        assert_eq!(biased.chain.priority(), 1 + 10);
    }

    #[test]
    fn repeated_from_extends_one_table_list_condition() {
        let stub = select().from("a").from("b");
        assert_eq!(stub.chain.0.len(), 2);
        assert_eq!(stub.chain.0[1].to_string(), "FROM a, b");
    }

    #[test]
    fn column_filter_rewrites_the_kind_condition_in_place() {
        let stub = insert().columns(["name", "brewery"]);
        assert_eq!(stub.chain.0.len(), 1);
        assert_eq!(stub.chain.priority(), 2);
        // delete stubs have no column list to filter on
        let stub = delete().columns(["name"]);
        assert_eq!(stub.chain.priority(), 1);
    }

    #[test]
    fn exec_result_fields_error_when_unset() {
        let stub = update().result(None, 1);
        let result = stub.resolve().expect("result should resolve");
        assert!(matches!(
            result.last_insert_id(),
            Err(Error::NoLastInsertId)
        ));
        assert_eq!(result.rows_affected().expect("rows set"), 1);

        let stub = insert().result(3, 1);
        let result = stub.resolve().expect("result should resolve");
        assert_eq!(result.last_insert_id().expect("id set"), 3);
    }

    #[test]
    fn unterminated_stub_resolves_to_unresolved() {
        assert!(matches!(update().resolve(), Err(Error::Unresolved)));
    }

    #[test]
    fn stub_error_takes_precedence_verbatim() {
        let stub = delete().error(std::io::Error::other("boom"));
        match stub.resolve() {
            Err(Error::Stubbed(err)) => assert_eq!(err.to_string(), "boom"),
            other => panic!("expected stubbed error, got {other:?}"),
        }
    }
}
