//! The mock connection context: stub registry plus dispatch.
//!
//! A [`Mock`] owns two ordered stub collections (reads and writes) behind
//! a single lock. Collections re-sort by descending chain priority after
//! every registration; the sort is stable, so equal-priority stubs keep
//! registration order and the first registered wins ties. Dispatch scans
//! in that order and the first fully-matching chain is the result.
use crate::*;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::Arc;

/// Cloneable handle to one mock connection's registry. Construct one per
/// test (or test run) and inject it wherever the code under test expects
/// a connection seam; clones share the same registry.
#[derive(Clone)]
pub struct Mock {
    inner: Arc<Mutex<Registry>>,
}

struct Registry {
    stubs: Vec<Stub>,
    exec_stubs: Vec<ExecStub>,
    verbose: bool,
    time_layout: Option<String>,
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

impl Mock {
    pub fn new() -> Self {
        let cfg = config();
        Self {
            inner: Arc::new(Mutex::new(Registry {
                stubs: Vec::new(),
                exec_stubs: Vec::new(),
                verbose: cfg.verbose,
                time_layout: cfg.time_layout.clone(),
            })),
        }
    }

    /// Registers a read stub. The chain is fixed from here on; only its
    /// deferred response may still resolve later.
    pub fn stub(&self, stub: Stub) {
        let mut reg = self.inner.lock();
        debug!(priority = stub.chain.priority(), "registering query stub");
        reg.stubs.push(stub);
        reg.stubs
            .sort_by(|a, b| b.chain.priority().cmp(&a.chain.priority()));
    }

    /// Registers a write stub.
    pub fn stub_exec(&self, stub: ExecStub) {
        let mut reg = self.inner.lock();
        debug!(priority = stub.chain.priority(), "registering exec stub");
        reg.exec_stubs.push(stub);
        reg.exec_stubs
            .sort_by(|a, b| b.chain.priority().cmp(&a.chain.priority()));
    }

    /// Dispatches a read. Returns the first matching stub's rows or
    /// error, or [`Error::Unstubbed`] when nothing matches.
    pub fn query(&self, sql: &str, args: Vec<Value>) -> Result<Rows> {
        let mut reg = self.inner.lock();
        let verbose = reg.verbose;
        let input = Input::parse(sql, args, reg.time_layout.clone())?;
        match reg.stubs.iter_mut().find(|s| s.matches(&input)) {
            Some(stub) => {
                stub.run_hooks(&input);
                stub.resolve(&input)
            }
            None => {
                if verbose {
                    warn!(query = sql, args = ?input.args(), "query not stubbed");
                }
                Err(Error::Unstubbed)
            }
        }
    }

    /// Dispatches a write. Same selection as [`Mock::query`], with a
    /// write result instead of rows.
    pub fn exec(&self, sql: &str, args: Vec<Value>) -> Result<ExecResult> {
        let reg = self.inner.lock();
        let input = Input::parse(sql, args, reg.time_layout.clone())?;
        match reg.exec_stubs.iter().find(|s| s.matches(&input)) {
            Some(stub) => {
                stub.run_hooks(&input);
                stub.resolve()
            }
            None => {
                if reg.verbose {
                    warn!(query = sql, args = ?input.args(), "exec not stubbed");
                }
                Err(Error::Unstubbed)
            }
        }
    }

    /// Removes every registered stub, intended between test cases.
    pub fn reset(&self) {
        let mut reg = self.inner.lock();
        reg.stubs.clear();
        reg.exec_stubs.clear();
    }

    /// Turns unmatched-dispatch logging on or off.
    pub fn set_verbose(&self, verbose: bool) {
        self.inner.lock().verbose = verbose;
    }

    /// Sets the `chrono` format layout used to compare timestamps with
    /// driver-side text, or `None` to compare structurally.
    pub fn set_time_layout(&self, layout: Option<&str>) {
        self.inner.lock().time_layout = layout.map(ToString::to_string);
    }

    /// Renders every registered stub in scan order with its computed
    /// priority and per-clause contribution, for debugging unmatched
    /// queries.
    pub fn dump(&self) -> String {
        let reg = self.inner.lock();
        let mut out = String::new();
        let _ = writeln!(out, ">> Query stubs: ({} total)", reg.stubs.len());
        let _ = writeln!(out, "=========================");
        for (rank, stub) in reg.stubs.iter().enumerate() {
            render_chain(&mut out, rank, &stub.chain);
            let line = match &stub.response {
                ReadResponse::Error(err) => format!("→ error: {err}"),
                ReadResponse::Rows(_) | ReadResponse::Tabular(_) => "→ data".into(),
                ReadResponse::Pending => "→ pending".into(),
            };
            let _ = writeln!(out, "\t\t{line}");
        }
        let _ = writeln!(out, ">> Exec stubs: ({} total)", reg.exec_stubs.len());
        let _ = writeln!(out, "=========================");
        for (rank, stub) in reg.exec_stubs.iter().enumerate() {
            render_chain(&mut out, rank, &stub.chain);
            let line = match &stub.response {
                ExecResponse::Error(err) => format!("→ error: {err}"),
                ExecResponse::Result(result) => format!("→ result {result:?}"),
                ExecResponse::Pending => "→ pending".into(),
            };
            let _ = writeln!(out, "\t\t{line}");
        }
        out
    }
}

fn render_chain(out: &mut String, rank: usize, chain: &Chain) {
    for (i, cond) in chain.0.iter().enumerate() {
        let _ = if i == 0 {
            writeln!(
                out,
                "#{}\t[{}]\t{cond} [{:+}]",
                rank + 1,
                chain.priority(),
                cond.priority(),
            )
        } else {
            writeln!(out, "\t\t{cond} [{:+}]", cond.priority())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEER_CSV: &str = "1,Yona Yona Ale,Yo-Ho Brewing,5.5\n2,Punk IPA,BrewDog,5.6";
    const BEER_QUERY: &str = "SELECT id, name, brewery, pct FROM beer WHERE pct > ?";

    fn mock() -> Mock {
        common_init();
        Mock::new()
    }

    #[test]
    fn bare_select_stub_serves_canned_text() {
        let db = mock();
        db.stub(select().csv("1,Yona Yona Ale,Yo-Ho Brewing,5.5"));

        let rows = db.query(BEER_QUERY, params![5]).expect("query should match");
        assert_eq!(rows.columns(), &["id", "name", "brewery", "pct"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.get(0).unwrap()[1], Value::Text("Yona Yona Ale".into()));
    }

    #[test]
    fn column_filtered_stub_rejects_other_projections() {
        let db = mock();
        db.stub(select().columns(["id"]).from("beer").csv("1"));

        let err = db.query(BEER_QUERY, params![5]).unwrap_err();
        assert!(matches!(err, Error::Unstubbed));

        let rows = db
            .query("SELECT id FROM beer", params![])
            .expect("matching projection");
        assert_eq!(rows.columns(), &["id"]);
    }

    #[test]
    fn insert_cell_filter_matches_on_bound_values() {
        let db = mock();
        db.stub_exec(insert().value("brewery", "Mikkeller").result(3, 1));

        let sql = "INSERT INTO beer (name, brewery, pct) VALUES (?, ?, ?)";
        let result = db
            .exec(sql, params!["X", "Mikkeller", 4.6])
            .expect("matching insert");
        assert_eq!(result.last_insert_id().unwrap(), 3);

        let err = db.exec(sql, params!["X", "Other", 4.6]).unwrap_err();
        assert!(matches!(err, Error::Unstubbed));
    }

    #[test]
    fn more_specific_chain_wins_over_bare_kind() {
        let db = mock();
        db.stub_exec(update().rows_affected(1));
        db.stub_exec(update().where_eq("id", 3).rows_affected(7));

        let result = db
            .exec("UPDATE beer SET pct = ? WHERE id = 3", params![4.6])
            .expect("update should match");
        assert_eq!(result.rows_affected().unwrap(), 7);

        // a non-matching id falls back to the bare stub
        let result = db
            .exec("UPDATE beer SET pct = ? WHERE id = 4", params![4.6])
            .expect("update should match");
        assert_eq!(result.rows_affected().unwrap(), 1);
    }

    #[test]
    fn in_list_matches_operator_aware_and_plain_filters() {
        let sql = "SELECT COUNT(*) FROM beer WHERE pct IN (5.4, ?)";

        let db = mock();
        db.stub(select().where_op("pct", "IN", [5.4, 10.2]).csv("2"));
        assert_eq!(db.query(sql, params![10.2]).expect("op filter").len(), 1);

        db.reset();
        db.stub(select().where_in("pct", [5.4, 10.2]).csv("2"));
        assert_eq!(db.query(sql, params![10.2]).expect("plain filter").len(), 1);
    }

    #[test]
    fn registry_stays_sorted_by_non_increasing_priority() {
        let db = mock();
        db.stub(select().csv(""));
        db.stub(select().columns(["id"]).from("beer").csv(""));
        db.stub(select().priority(10).csv(""));
        db.stub(select().where_eq("id", 1).csv(""));

        let reg = db.inner.lock();
        let priorities: Vec<i32> = reg.stubs.iter().map(|s| s.chain.priority()).collect();
        assert_eq!(priorities, vec![11, 3, 2, 1]);
        assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn equal_priority_ties_go_to_the_first_registered() {
        let db = mock();
        db.stub(select().csv("first"));
        db.stub(select().csv("second"));

        let rows = db
            .query("SELECT a FROM t", params![])
            .expect("query should match");
        assert_eq!(rows.get(0).unwrap()[0], Value::Text("first".into()));
    }

    #[test]
    fn dispatch_is_idempotent_and_deferred_data_freezes() {
        let db = mock();
        db.stub(select().csv("1,2"));

        let first = db.query("SELECT a, b FROM t", params![]).expect("match");
        let again = db.query("SELECT a, b FROM t", params![]).expect("match");
        assert_eq!(first, again);

        // a later, wider match reuses the frozen two-cell rows; only the
        // column header tracks the new query
        let wider = db.query("SELECT a, b, c FROM t", params![]).expect("match");
        assert_eq!(wider.columns().len(), 3);
        assert_eq!(wider.get(0).unwrap().len(), 2);
    }

    #[test]
    fn exactly_one_of_error_or_data_per_dispatch() {
        let db = mock();
        db.stub(select().error(std::io::Error::other("canned failure")));

        match db.query("SELECT a FROM t", params![]) {
            Err(Error::Stubbed(err)) => assert_eq!(err.to_string(), "canned failure"),
            other => panic!("expected the stubbed error, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_registration_reports_unresolved() {
        let db = mock();
        db.stub(select().from("beer"));
        let err = db.query("SELECT id FROM beer", params![]).unwrap_err();
        assert!(matches!(err, Error::Unresolved));
    }

    #[test]
    fn reset_clears_both_collections() {
        let db = mock();
        db.stub(select().csv("1"));
        db.stub_exec(delete().rows_affected(1));
        db.reset();

        assert!(matches!(
            db.query("SELECT a FROM t", params![]),
            Err(Error::Unstubbed)
        ));
        assert!(matches!(
            db.exec("DELETE FROM t", params![]),
            Err(Error::Unstubbed)
        ));
    }

    #[test]
    fn parse_failure_is_not_an_unstubbed_query() {
        let db = mock();
        db.set_verbose(true);
        let err = db.query("SELECT FROM WHERE !!!", params![]).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn args_filter_matches_the_bound_arguments() {
        let db = mock();
        db.stub(select().args([5]).csv("2"));

        assert!(db.query(BEER_QUERY, params![5]).is_ok());
        db.reset();
        db.stub(select().args(["five"]).csv("2"));
        assert!(matches!(
            db.query(BEER_QUERY, params![5]),
            Err(Error::Unstubbed)
        ));
    }

    #[test]
    fn delete_stub_with_table_and_where() {
        let db = mock();
        db.stub_exec(
            delete()
                .from_table("beer")
                .where_eq("id", 42)
                .rows_affected(1),
        );

        let result = db
            .exec("DELETE FROM beer WHERE id = ?", params![42])
            .expect("delete should match");
        assert_eq!(result.rows_affected().unwrap(), 1);

        let err = db
            .exec("DELETE FROM beer WHERE id = ?", params![50])
            .unwrap_err();
        assert!(matches!(err, Error::Unstubbed));
    }

    #[test]
    fn time_layout_bridges_text_and_timestamp_values() {
        use chrono::NaiveDateTime;
        let layout = "%Y-%m-%dT%H:%M:%S";
        let now = NaiveDateTime::parse_from_str("2015-03-01T17:00:00", layout).unwrap();

        let db = mock();
        db.set_time_layout(Some(layout));
        db.stub_exec(update().value("updated_at", now).rows_affected(1));

        let result = db.exec(
            "UPDATE beer SET updated_at = ? WHERE id = 3",
            params!["2015-03-01T17:00:00"],
        );
        assert!(result.is_ok());

        db.set_time_layout(None);
        assert!(matches!(
            db.exec(
                "UPDATE beer SET updated_at = ? WHERE id = 3",
                params!["2015-03-01T17:00:00"],
            ),
            Err(Error::Unstubbed)
        ));
    }

    #[test]
    fn boolean_updates_match_integer_encodings() {
        let db = mock();
        db.stub_exec(update().value("awesome", true).rows_affected(1));
        let result = db.exec("UPDATE beer SET awesome = 1 WHERE id = 3", params![]);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn notify_fires_exactly_once_per_dispatch() {
        let db = mock();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        // a second, lower-priority stub would also have matched; only the
        // selected stub's hooks may fire
        db.stub(select().where_eq("pct", 5).notify(tx).csv("1"));
        db.stub(select().csv("1"));

        db.query(BEER_QUERY, params![5]).expect("query should match");
        rx.recv().await.expect("one signal");
        assert!(rx.try_recv().is_err());

        db.query(BEER_QUERY, params![5]).expect("query should match");
        rx.recv().await.expect("second dispatch signals again");
    }

    #[test]
    fn notify_without_a_receiver_never_blocks_dispatch() {
        let db = mock();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        drop(rx);
        db.stub(select().notify(tx).dump().csv("1"));
        assert!(db.query("SELECT a FROM t", params![]).is_ok());
    }

    #[test]
    fn dump_report_lists_chains_with_contributions() {
        let db = mock();
        db.stub(select().columns(["id"]).from("beer").csv("1"));
        db.stub_exec(update().where_eq("id", 3).rows_affected(1));
        db.stub_exec(insert().error(std::io::Error::other("nope")));

        let report = db.dump();
        assert!(report.contains("Query stubs: (1 total)"));
        assert!(report.contains("#1\t[3]\tSELECT id [+2]"));
        assert!(report.contains("FROM beer [+1]"));
        assert!(report.contains("Exec stubs: (2 total)"));
        assert!(report.contains("WHERE id ≈ [3] [+1]"));
        assert!(report.contains("→ error: nope"));
    }

    #[test]
    fn clones_share_one_registry() {
        let db = mock();
        let handle = db.clone();
        handle.stub(select().csv("1"));
        assert!(db.query("SELECT a FROM t", params![]).is_ok());
    }
}
