//! Normalized per-call view of a parsed statement plus its bound
//! arguments.
//!
//! An [`Input`] is built once per dispatch. All derived views (columns,
//! tables, INSERT rows, UPDATE assignments, WHERE maps) are extracted in
//! a single left-to-right traversal of the AST, during which each `?`
//! placeholder consumes the next unused bound argument and `$N`
//! placeholders resolve by index. Conditions evaluated against the same
//! dispatch therefore always see one consistent extraction.
//!
//! Column name rules (projection and INSERT/UPDATE targets):
//! - `SELECT a`          → `a`
//! - `SELECT a.b`        → `a.b`
//! - `SELECT a.b AS c`   → `c`
//! - `SELECT COUNT(*)`   → `COUNT(*)`
//! - `SELECT *`          → `*`
use crate::*;
use itertools::Itertools;
use sqlparser::ast::{
    Assignment, AssignmentTarget, BinaryOperator, Delete, Expr, FromTable, Function, FunctionArg,
    FunctionArgExpr, FunctionArguments, Ident, Insert, ObjectName, ObjectNamePart, Query,
    SelectItem, SelectItemQualifiedWildcardKind, SetExpr, Statement, TableFactor, TableObject,
    TableWithJoins, UnaryOperator, Value as AstValue,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser, ParserError};
use std::collections::HashMap;

static DIALECT: GenericDialect = GenericDialect {};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

#[derive(Debug)]
pub struct Input {
    query: String,
    statement: Statement,
    args: Vec<Value>,
    time_layout: Option<String>,

    cols: Vec<String>,
    tables: Vec<String>,
    rows: Vec<HashMap<String, Value>>,
    assignments: HashMap<String, Value>,
    where_values: HashMap<String, WhereValue>,
    where_by_op: HashMap<(String, String), WhereValue>,
}

impl Input {
    /// Parses `query` and derives all views against `args`. Parse
    /// failures surface immediately; they are never treated as "no stub
    /// matches".
    pub(crate) fn parse(query: &str, args: Vec<Value>, time_layout: Option<String>) -> Result<Self> {
        let mut statements = Parser::parse_sql(&DIALECT, query)?;
        if statements.is_empty() {
            return Err(ParserError::ParserError("empty query".into()).into());
        }
        if statements.len() > 1 {
            debug!("multiple statements in one query, matching the first");
        }
        let statement = statements.remove(0);

        let mut views = Views::default();
        let mut cursor = ArgCursor::new(&args);
        match &statement {
            Statement::Query(query) => derive_query(query, &mut cursor, &mut views),
            Statement::Insert(insert) => derive_insert(insert, &mut cursor, &mut views),
            Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => derive_update(table, assignments, selection.as_ref(), &mut cursor, &mut views),
            Statement::Delete(delete) => derive_delete(delete, &mut cursor, &mut views),
            other => debug!("unsupported statement shape: {other}"),
        }

        Ok(Self {
            query: query.to_string(),
            statement,
            args,
            time_layout,
            cols: views.cols,
            tables: views.tables,
            rows: views.rows,
            assignments: views.assignments,
            where_values: views.where_values,
            where_by_op: views.where_by_op,
        })
    }

    pub(crate) fn kind(&self) -> StatementKind {
        match &self.statement {
            Statement::Query(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update { .. } => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }

    /// Projected column names (SELECT), insert column list (INSERT), or
    /// SET targets (UPDATE). Empty for DELETE.
    pub fn columns(&self) -> &[String] {
        &self.cols
    }

    /// Un-aliased table names from FROM/JOIN, or the single write target.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    /// Normalized bound arguments, in call order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// One lowercased-column → value map per INSERT VALUES tuple.
    pub(crate) fn rows(&self) -> &[HashMap<String, Value>] {
        &self.rows
    }

    /// Lowercased UPDATE SET column → value map.
    pub(crate) fn assignments(&self) -> &HashMap<String, Value> {
        &self.assignments
    }

    /// Lowercased WHERE column → value (IN lists become `Many`).
    pub(crate) fn where_values(&self) -> &HashMap<String, WhereValue> {
        &self.where_values
    }

    /// WHERE entries keyed by (lowercased column, lowercased operator).
    pub(crate) fn where_by_op(&self) -> &HashMap<(String, String), WhereValue> {
        &self.where_by_op
    }

    pub(crate) fn time_layout(&self) -> Option<&str> {
        self.time_layout.as_deref()
    }

    /// Diagnostic rendering of everything derived from this call.
    pub(crate) fn dump(&self) {
        info!(
            query = %self.query,
            args = ?self.args,
            columns = ?self.cols,
            tables = ?self.tables,
            where_values = ?self.where_values,
            rows = ?self.rows,
            assignments = ?self.assignments,
            statement = ?self.statement,
            "input dump",
        );
    }
}

#[derive(Default)]
struct Views {
    cols: Vec<String>,
    tables: Vec<String>,
    rows: Vec<HashMap<String, Value>>,
    assignments: HashMap<String, Value>,
    where_values: HashMap<String, WhereValue>,
    where_by_op: HashMap<(String, String), WhereValue>,
}

/// Resolves placeholder markers against the bound-argument list. `?`
/// consumes the next unused argument; `$N` is 1-based and positional.
/// Placeholders must map 1:1 onto the arguments, so an out-of-range
/// reference is a test-setup defect and panics.
struct ArgCursor<'a> {
    args: &'a [Value],
    next: usize,
}

impl<'a> ArgCursor<'a> {
    fn new(args: &'a [Value]) -> Self {
        Self { args, next: 0 }
    }

    fn resolve(&mut self, marker: &str) -> Value {
        let idx = match marker.strip_prefix('$').and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n > 0 => n - 1,
            _ => {
                let idx = self.next;
                self.next += 1;
                idx
            }
        };
        match self.args.get(idx) {
            Some(v) => v.clone(),
            None => panic!(
                "placeholder {marker} refers to bound argument {} but only {} were supplied",
                idx + 1,
                self.args.len(),
            ),
        }
    }
}

fn derive_query(query: &Query, cursor: &mut ArgCursor, views: &mut Views) {
    let SetExpr::Select(select) = query.body.as_ref() else {
        debug!("unsupported query body: {}", query.body);
        return;
    };
    for item in &select.projection {
        views.cols.push(select_item_name(item, cursor));
    }
    collect_table_list(&select.from, &mut views.tables);
    if let Some(selection) = &select.selection {
        extract_where(selection, cursor, views);
    }
}

fn derive_insert(insert: &Insert, cursor: &mut ArgCursor, views: &mut Views) {
    views.cols.extend(insert.columns.iter().map(|c| c.value.clone()));
    if let TableObject::TableName(name) = &insert.table {
        views.tables.extend(object_tail(name));
    }
    let Some(source) = &insert.source else {
        return;
    };
    let SetExpr::Values(values) = source.body.as_ref() else {
        debug!("unsupported insert source: {}", source.body);
        return;
    };
    for tuple in &values.rows {
        let mut row = HashMap::new();
        for (col, expr) in views.cols.iter().zip(tuple) {
            row.insert(col.to_lowercase(), eval_expr(expr, cursor));
        }
        views.rows.push(row);
    }
}

fn derive_update(
    table: &TableWithJoins,
    assignments: &[Assignment],
    selection: Option<&Expr>,
    cursor: &mut ArgCursor,
    views: &mut Views,
) {
    for assignment in assignments {
        let AssignmentTarget::ColumnName(name) = &assignment.target else {
            debug!("unsupported assignment target: {}", assignment.target);
            continue;
        };
        let col = object_parts(name);
        let value = eval_expr(&assignment.value, cursor);
        views.assignments.insert(col.to_lowercase(), value);
        views.cols.push(col);
    }
    collect_tables(&table.relation, &mut views.tables);
    for join in &table.joins {
        collect_tables(&join.relation, &mut views.tables);
    }
    if let Some(selection) = selection {
        extract_where(selection, cursor, views);
    }
}

fn derive_delete(delete: &Delete, cursor: &mut ArgCursor, views: &mut Views) {
    let tables = match &delete.from {
        FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
    };
    collect_table_list(tables, &mut views.tables);
    if let Some(selection) = &delete.selection {
        extract_where(selection, cursor, views);
    }
}

/// Records WHERE predicates, walking AND/OR chains. A comparison lands
/// both in the plain map and in the operator-keyed map; `IN` lists land
/// under the `in` operator with the whole value list. Shapes the matcher
/// does not understand are skipped, leaving the maps sparse.
fn extract_where(expr: &Expr, cursor: &mut ArgCursor, views: &mut Views) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And | BinaryOperator::Or,
            right,
        } => {
            extract_where(left, cursor, views);
            extract_where(right, cursor, views);
        }
        Expr::BinaryOp { left, op, right } => {
            let value = eval_expr(right, cursor);
            let Some(col) = column_ref(left) else {
                debug!("skipping non-column comparison: {expr}");
                return;
            };
            let col = col.to_lowercase();
            let op = op.to_string().to_lowercase();
            views
                .where_values
                .insert(col.clone(), WhereValue::One(value.clone()));
            views.where_by_op.insert((col, op), WhereValue::One(value));
        }
        Expr::InList {
            expr: col_expr,
            list,
            negated: false,
        } => {
            let values: Vec<Value> = list.iter().map(|e| eval_expr(e, cursor)).collect();
            let Some(col) = column_ref(col_expr) else {
                debug!("skipping non-column IN list: {expr}");
                return;
            };
            let col = col.to_lowercase();
            views
                .where_values
                .insert(col.clone(), WhereValue::Many(values.clone()));
            views
                .where_by_op
                .insert((col, "in".into()), WhereValue::Many(values));
        }
        Expr::Nested(inner) => extract_where(inner, cursor, views),
        other => debug!("skipping WHERE shape: {other}"),
    }
}

/// Converts a value-position expression into a normalized `Value`,
/// consuming placeholders along the way.
fn eval_expr(expr: &Expr, cursor: &mut ArgCursor) -> Value {
    match expr {
        Expr::Value(v) => match &v.value {
            AstValue::Placeholder(marker) => cursor.resolve(marker),
            AstValue::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Value::Int(i)
                } else if let Ok(f) = n.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            AstValue::SingleQuotedString(s) | AstValue::DoubleQuotedString(s) => {
                Value::Text(s.clone())
            }
            AstValue::Boolean(b) => Value::Bool(*b),
            AstValue::Null => Value::Null,
            other => {
                debug!("unsupported literal: {other}");
                Value::Null
            }
        },
        // bare or quoted words in value position carry their text
        Expr::Identifier(ident) => Value::Text(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => Value::Text(dotted(parts)),
        Expr::Nested(inner) => eval_expr(inner, cursor),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match eval_expr(expr, cursor) {
            Value::Int(i) => Value::Int(-i),
            Value::Float(f) => Value::Float(-f),
            other => other,
        },
        other => {
            debug!("unsupported value expression: {other}");
            Value::Null
        }
    }
}

fn select_item_name(item: &SelectItem, cursor: &mut ArgCursor) -> String {
    match item {
        SelectItem::UnnamedExpr(expr) => expr_name(expr, cursor),
        SelectItem::ExprWithAlias { expr, alias } => {
            // walk the expression anyway so placeholders keep their order
            let _ = expr_name(expr, cursor);
            alias.value.clone()
        }
        SelectItem::Wildcard(_) => "*".into(),
        SelectItem::QualifiedWildcard(kind, _) => match kind {
            SelectItemQualifiedWildcardKind::ObjectName(name) => format!("{name}.*"),
            SelectItemQualifiedWildcardKind::Expr(expr) => format!("{expr}.*"),
        },
    }
}

fn expr_name(expr: &Expr, cursor: &mut ArgCursor) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => dotted(parts),
        Expr::Function(func) => function_name(func, cursor),
        other => eval_expr(other, cursor).to_string(),
    }
}

/// `count(abc)` renders as `COUNT(abc)`, `count(*)` as `COUNT(*)`.
fn function_name(func: &Function, cursor: &mut ArgCursor) -> String {
    let name = func.name.to_string().to_uppercase();
    let args = match &func.args {
        FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => expr_name(expr, cursor),
                FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => "*".into(),
                FunctionArg::Unnamed(FunctionArgExpr::QualifiedWildcard(name)) => {
                    format!("{name}.*")
                }
                other => other.to_string(),
            })
            .join(", "),
        _ => String::new(),
    };
    format!("{name}({args})")
}

fn column_ref(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => Some(dotted(parts)),
        Expr::Nested(inner) => column_ref(inner),
        _ => None,
    }
}

fn dotted(parts: &[Ident]) -> String {
    parts.iter().map(|i| i.value.as_str()).join(".")
}

fn collect_table_list(list: &[TableWithJoins], out: &mut Vec<String>) {
    for twj in list {
        collect_tables(&twj.relation, out);
        for join in &twj.joins {
            collect_tables(&join.relation, out);
        }
    }
}

fn collect_tables(factor: &TableFactor, out: &mut Vec<String>) {
    match factor {
        TableFactor::Table { name, .. } => out.extend(object_tail(name)),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_tables(&table_with_joins.relation, out);
            for join in &table_with_joins.joins {
                collect_tables(&join.relation, out);
            }
        }
        other => debug!("skipping table factor: {other}"),
    }
}

fn object_tail(name: &ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.clone()),
        _ => None,
    })
}

fn object_parts(name: &ObjectName) -> String {
    name.0
        .iter()
        .filter_map(|part| match part {
            ObjectNamePart::Identifier(ident) => Some(ident.value.as_str()),
            _ => None,
        })
        .join(".")
}
