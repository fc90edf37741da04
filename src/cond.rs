//! Atomic matching conditions and their AND-composition.
//!
//! The condition set is closed: every rule a stub can express is one of
//! these variants, each answering `matches`, `priority`, and `Display`.
//! Priority weights encode specificity so that the most specific of
//! several simultaneously-matching chains wins: a bare statement-kind
//! check scores 1, an explicit column/table filter 2, an operator-aware
//! WHERE filter 2, and `Priority` adds a flat unconditional bias.
use crate::*;
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone)]
pub(crate) enum Cond {
    Select { cols: Vec<String> },
    From { tables: Vec<String> },
    Insert { cols: Vec<String> },
    Update { cols: Vec<String> },
    Delete,
    Table { table: String },
    Where { col: String, values: Vec<Value> },
    WhereOp { col: String, op: String, values: Vec<Value> },
    Cell { row: usize, col: String, value: Value },
    Args { args: Vec<Value> },
    Priority(i32),
}

impl Cond {
    /// Zero configured filter values means "match any statement of this
    /// kind"; unresolvable keys and out-of-range rows are non-matches,
    /// never errors.
    pub(crate) fn matches(&self, input: &Input) -> bool {
        let layout = input.time_layout();
        match self {
            Cond::Select { cols } => {
                input.kind() == StatementKind::Select
                    && (cols.is_empty() || eq_fold(cols, input.columns()))
            }
            Cond::Insert { cols } => {
                input.kind() == StatementKind::Insert
                    && (cols.is_empty() || eq_fold(cols, input.columns()))
            }
            Cond::Update { cols } => {
                input.kind() == StatementKind::Update
                    && (cols.is_empty() || eq_fold(cols, input.columns()))
            }
            Cond::Delete => input.kind() == StatementKind::Delete,
            Cond::From { tables } => {
                let observed: &[String] = match input.kind() {
                    StatementKind::Select => input.tables(),
                    _ => &[],
                };
                eq_fold(tables, observed)
            }
            Cond::Table { table } => {
                matches!(
                    input.kind(),
                    StatementKind::Insert | StatementKind::Update | StatementKind::Delete
                ) && input
                    .tables()
                    .first()
                    .is_some_and(|t| t.to_lowercase() == table.to_lowercase())
            }
            Cond::Where { col, values } => input
                .where_values()
                .get(col)
                .is_some_and(|observed| where_matches(observed, values, layout)),
            Cond::WhereOp { col, op, values } => input
                .where_by_op()
                .get(&(col.clone(), op.clone()))
                .is_some_and(|observed| where_matches(observed, values, layout)),
            Cond::Cell { row, col, value } => match input.kind() {
                StatementKind::Insert => input
                    .rows()
                    .get(*row)
                    .and_then(|r| r.get(col))
                    .is_some_and(|observed| equals(observed, value, layout)),
                StatementKind::Update => input
                    .assignments()
                    .get(col)
                    .is_some_and(|observed| equals(observed, value, layout)),
                _ => false,
            },
            Cond::Args { args } => {
                args.len() == input.args().len()
                    && args
                        .iter()
                        .zip(input.args())
                        .all(|(want, got)| equals(got, want, layout))
            }
            Cond::Priority(_) => true,
        }
    }

    pub(crate) fn priority(&self) -> i32 {
        match self {
            Cond::Select { cols } | Cond::Insert { cols } | Cond::Update { cols } => {
                if cols.is_empty() { 1 } else { 2 }
            }
            Cond::Delete => 1,
            Cond::From { tables } => {
                if tables.is_empty() { 0 } else { 1 }
            }
            Cond::Table { .. } => 1,
            Cond::Where { .. } => 1,
            Cond::WhereOp { .. } => 2,
            Cond::Cell { .. } => 1,
            Cond::Args { .. } => 1,
            Cond::Priority(p) => *p,
        }
    }
}

/// A multi-value WHERE entry compares the whole list; a single-value
/// entry compares against the first expected value, so a value-list
/// filter also matches plain equality on its head.
fn where_matches(observed: &WhereValue, expected: &[Value], layout: Option<&str>) -> bool {
    match observed {
        WhereValue::Many(got) => {
            got.len() == expected.len()
                && got
                    .iter()
                    .zip(expected)
                    .all(|(g, w)| equals(g, w, layout))
        }
        WhereValue::One(got) => expected.first().is_some_and(|w| equals(got, w, layout)),
    }
}

fn eq_fold(expected: &[String], observed: &[String]) -> bool {
    expected.len() == observed.len()
        && expected
            .iter()
            .zip(observed)
            .all(|(e, o)| e.to_lowercase() == o.to_lowercase())
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::Select { cols } => write!(f, "SELECT {}", list_or_any(cols)),
            Cond::From { tables } => write!(f, "FROM {}", tables.iter().join(", ")),
            Cond::Insert { cols } => write!(f, "INSERT {}", list_or_any(cols)),
            Cond::Update { cols } => write!(f, "UPDATE {}", list_or_any(cols)),
            Cond::Delete => f.write_str("DELETE"),
            Cond::Table { table } => write!(f, "TABLE {table}"),
            Cond::Where { col, values } => {
                write!(f, "WHERE {col} ≈ [{}]", values.iter().join(", "))
            }
            Cond::WhereOp { col, op, values } => {
                write!(
                    f,
                    "WHERE {col} {} [{}]",
                    op.to_uppercase(),
                    values.iter().join(", "),
                )
            }
            Cond::Cell { row, col, value } => {
                write!(f, "VALUE {col} ≈ {value} (row {row})")
            }
            Cond::Args { args } => write!(f, "WITH ARGS [{}]", args.iter().join(", ")),
            Cond::Priority(_) => f.write_str("PRIORITY"),
        }
    }
}

fn list_or_any(cols: &[String]) -> String {
    if cols.is_empty() {
        "(any)".into()
    } else {
        cols.iter().join(", ")
    }
}

/// Ordered AND-composition of conditions. Matches iff every member
/// matches; priority is the sum of member priorities.
#[derive(Debug, Clone, Default)]
pub(crate) struct Chain(pub(crate) Vec<Cond>);

impl Chain {
    pub(crate) fn matches(&self, input: &Input) -> bool {
        self.0.iter().all(|c| c.matches(input))
    }

    pub(crate) fn priority(&self) -> i32 {
        self.0.iter().map(Cond::priority).sum()
    }

    pub(crate) fn push(&mut self, cond: Cond) {
        self.0.push(cond);
    }
}
