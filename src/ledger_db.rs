use chrono::{Local, NaiveDate};
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::{AnalysisRecord, PlanRecord};
use crate::plans::sync_plans_for_analysis;
use crate::stats::is_birthday_text_on;
use crate::store::{resolve_record_id, AnalysisStore};

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init.sql",
        include_str!("../db/migrations/0001_init.sql"),
    ),
    (
        "0002_plan_lookup_indexes.sql",
        include_str!("../db/migrations/0002_plan_lookup_indexes.sql"),
    ),
];

#[derive(Debug, Serialize)]
pub struct LedgerDbStatus {
    pub db_path: String,
    pub exists: bool,
    pub migration_files: Vec<String>,
    pub applied_versions: Vec<String>,
    pub pending_versions: Vec<String>,
    pub schema_migrations_table_exists: bool,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct LedgerDbMigrateResult {
    pub db_path: String,
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
    pub applied_total: usize,
    pub pending_total: usize,
}

fn map_sqlite_conflict(prefix: &str, err: rusqlite::Error) -> String {
    let msg = err.to_string();
    if msg.contains("UNIQUE constraint failed") {
        format!("{prefix} (conflicts with an existing record): {msg}")
    } else {
        format!("{prefix}: {msg}")
    }
}

const SCHEMA_MIGRATIONS_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version TEXT PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
"#;

fn embedded_versions() -> impl Iterator<Item = &'static str> {
    MIGRATIONS.iter().map(|(version, _)| *version)
}

/// Versions recorded in `schema_migrations`. A database that never ran a
/// migration reads as `tracked == false` with no versions.
struct AppliedMigrations {
    tracked: bool,
    versions: Vec<String>,
}

impl AppliedMigrations {
    fn read(conn: &Connection) -> Result<Self, String> {
        let tracked: bool = conn
            .query_row(
                "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| format!("check schema_migrations failed: {e}"))?;
        if !tracked {
            return Ok(Self {
                tracked,
                versions: Vec::new(),
            });
        }
        let mut stmt = conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")
            .map_err(|e| format!("read schema_migrations failed: {e}"))?;
        let versions = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| format!("read schema_migrations failed: {e}"))?;
        Ok(Self { tracked, versions })
    }

    fn contains(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    fn pending(&self) -> Vec<String> {
        embedded_versions()
            .filter(|v| !self.contains(v))
            .map(str::to_string)
            .collect()
    }
}

pub fn inspect_status_at_path(db_path: &Path) -> Result<LedgerDbStatus, String> {
    let exists = db_path.exists();
    let applied = if exists {
        let conn = Connection::open(db_path).map_err(|e| format!("open database failed: {e}"))?;
        Some(AppliedMigrations::read(&conn)?)
    } else {
        None
    };
    let (tracked, applied_versions, pending_versions) = match applied {
        Some(applied) => {
            let pending = applied.pending();
            (applied.tracked, applied.versions, pending)
        }
        None => (false, Vec::new(), embedded_versions().map(str::to_string).collect()),
    };

    Ok(LedgerDbStatus {
        db_path: db_path.to_string_lossy().to_string(),
        exists,
        migration_files: embedded_versions().map(str::to_string).collect(),
        applied_versions,
        ready: exists && pending_versions.is_empty(),
        pending_versions,
        schema_migrations_table_exists: tracked,
    })
}

/// Runs every embedded migration the database has not recorded yet, each in
/// its own transaction together with its `schema_migrations` row.
pub fn apply_embedded_migrations(db_path: &Path) -> Result<LedgerDbMigrateResult, String> {
    let created = !db_path.exists();
    match db_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .map_err(|e| format!("create database directory failed: {e}"))?,
        _ => {}
    }

    let mut conn = Connection::open(db_path).map_err(|e| format!("open database failed: {e}"))?;
    conn.execute_batch(SCHEMA_MIGRATIONS_DDL)
        .map_err(|e| format!("init schema_migrations failed: {e}"))?;
    let before = AppliedMigrations::read(&conn)?;

    let (skipped, todo): (Vec<_>, Vec<_>) =
        MIGRATIONS.iter().partition(|(version, _)| before.contains(version));
    let mut applied_now = Vec::with_capacity(todo.len());
    for (version, sql) in todo {
        let fail = |stage: &str, e: rusqlite::Error| format!("{stage} migration {version} failed: {e}");
        let tx = conn.transaction().map_err(|e| fail("begin", e))?;
        tx.execute_batch(sql).map_err(|e| fail("apply", e))?;
        tx.execute("INSERT INTO schema_migrations(version) VALUES (?1)", [version])
            .map_err(|e| fail("record", e))?;
        tx.commit().map_err(|e| fail("commit", e))?;
        applied_now.push(version.to_string());
    }
    if !applied_now.is_empty() {
        info!(db = %db_path.display(), applied = ?applied_now, "ledger migrations applied");
    }

    let after = AppliedMigrations::read(&conn)?;
    Ok(LedgerDbMigrateResult {
        db_path: db_path.to_string_lossy().to_string(),
        created,
        applied_now,
        skipped: skipped.into_iter().map(|(v, _)| v.to_string()).collect(),
        applied_total: after.versions.len(),
        pending_total: after.pending().len(),
    })
}

fn decode_payload<T: serde::de::DeserializeOwned>(kind: &str, id: &str, payload: &str) -> Result<T, String> {
    serde_json::from_str(payload).map_err(|e| format!("decode {kind} {id} failed: {e}"))
}

fn load_plans(conn: &Connection) -> Result<Vec<PlanRecord>, String> {
    let mut stmt = conn
        .prepare("SELECT id, payload FROM plans ORDER BY position ASC, rowid ASC")
        .map_err(|e| format!("query plans failed: {e}"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|e| format!("query plans failed: {e}"))?;
    let mut plans = Vec::new();
    for row in rows {
        let (id, payload) = row.map_err(|e| format!("read plan failed: {e}"))?;
        let mut plan: PlanRecord = decode_payload("plan", &id, &payload)?;
        plan.id = id;
        plans.push(plan);
    }
    Ok(plans)
}

fn replace_plans(tx: &Transaction<'_>, plans: &[PlanRecord]) -> Result<(), String> {
    tx.execute("DELETE FROM plans", [])
        .map_err(|e| format!("clear plans failed: {e}"))?;
    let mut stmt = tx
        .prepare(
            r#"
            INSERT INTO plans(id, position, plan_type, analysis_id, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .map_err(|e| format!("prepare plan insert failed: {e}"))?;
    for (position, plan) in plans.iter().enumerate() {
        let payload =
            serde_json::to_string(plan).map_err(|e| format!("encode plan {} failed: {e}", plan.id))?;
        stmt.execute(params![
            plan.id,
            position as i64,
            plan.plan_type,
            plan.analysis_id,
            payload
        ])
        .map_err(|e| map_sqlite_conflict("write plan failed", e))?;
    }
    Ok(())
}

/// SQLite-backed [`AnalysisStore`]. Each call opens its own connection.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db_path: PathBuf,
    today: Option<NaiveDate>,
}

impl LedgerDb {
    /// Opens (creating if needed) the database and applies pending migrations.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, String> {
        let db_path = db_path.into();
        apply_embedded_migrations(&db_path)?;
        Ok(Self {
            db_path,
            today: None,
        })
    }

    /// Pins the calendar date used by the birthday check.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn status(&self) -> Result<LedgerDbStatus, String> {
        inspect_status_at_path(&self.db_path)
    }

    fn connect(&self) -> Result<Connection, String> {
        Connection::open(&self.db_path).map_err(|e| format!("open database failed: {e}"))
    }
}

impl AnalysisStore for LedgerDb {
    fn get_all_analyses(&self) -> Result<Vec<AnalysisRecord>, String> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT id, payload FROM analyses ORDER BY rowid ASC")
            .map_err(|e| format!("query analyses failed: {e}"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| format!("query analyses failed: {e}"))?;
        let mut out = Vec::new();
        for row in rows {
            let (id, payload) = row.map_err(|e| format!("read analysis failed: {e}"))?;
            let mut record: AnalysisRecord = decode_payload("analysis", &id, &payload)?;
            record.id = id;
            out.push(record);
        }
        Ok(out)
    }

    fn delete_analysis(&self, id: &str) -> Result<(), String> {
        let conn = self.connect()?;
        let deleted = conn
            .execute("DELETE FROM analyses WHERE id = ?1", [id])
            .map_err(|e| format!("delete analysis failed: {e}"))?;
        debug!(id, deleted, "analysis delete");
        Ok(())
    }

    fn save_analysis_with_plan(&self, record: &AnalysisRecord) -> Result<AnalysisRecord, String> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(|e| format!("begin transaction failed: {e}"))?;
        let already_stored: bool = tx
            .query_row(
                "SELECT count(*) > 0 FROM analyses WHERE id = ?1",
                [&record.id],
                |row| row.get(0),
            )
            .map_err(|e| format!("look up analysis {} failed: {e}", record.id))?;
        let stored = resolve_record_id(record, already_stored);
        let payload = serde_json::to_string(&stored)
            .map_err(|e| format!("encode analysis {} failed: {e}", stored.id))?;
        tx.execute(
            r#"
            INSERT INTO analyses(id, client_name, attendance_date, finished, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                client_name=excluded.client_name,
                attendance_date=excluded.attendance_date,
                finished=excluded.finished,
                payload=excluded.payload,
                updated_at=datetime('now')
            "#,
            params![
                stored.id,
                stored.display_name(),
                stored.attendance_date,
                stored.finished as i64,
                payload
            ],
        )
        .map_err(|e| map_sqlite_conflict("write analysis failed", e))?;

        let current = load_plans(&tx)?;
        let synced = sync_plans_for_analysis(current.clone(), &stored);
        if synced != current {
            replace_plans(&tx, &synced)?;
            debug!(id = %stored.id, plans = synced.len(), "plans synced for analysis");
        }
        tx.commit().map_err(|e| format!("commit transaction failed: {e}"))?;
        Ok(stored)
    }

    fn is_client_birthday_today(&self, date: &str) -> bool {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        is_birthday_text_on(date, today)
    }

    fn get_plans(&self) -> Result<Vec<PlanRecord>, String> {
        let conn = self.connect()?;
        load_plans(&conn)
    }

    fn save_plans(&self, plans: &[PlanRecord]) -> Result<(), String> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .map_err(|e| format!("begin transaction failed: {e}"))?;
        replace_plans(&tx, plans)?;
        tx.commit().map_err(|e| format!("commit transaction failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeeklyPlanData;
    use serde_json::json;
    use std::fs;
    use uuid::Uuid;

    fn create_temp_test_db() -> PathBuf {
        let unique = format!(
            "tarot_ledger_db_test_{}_{}.db",
            std::process::id(),
            Uuid::new_v4()
        );
        std::env::temp_dir().join(unique)
    }

    fn analysis(id: &str, name: &str) -> AnalysisRecord {
        serde_json::from_value(json!({
            "id": id,
            "nomeCliente": name,
            "dataAtendimento": "2026-04-02",
            "valor": "120",
            "finalizado": false,
            "baralho": "Rider-Waite",
        }))
        .expect("fixture analysis")
    }

    #[test]
    fn migrations_are_idempotent_and_reported() {
        let db_path = create_temp_test_db();
        let before = inspect_status_at_path(&db_path).expect("status before");
        assert!(!before.exists);
        assert_eq!(before.pending_versions.len(), MIGRATIONS.len());

        let first = apply_embedded_migrations(&db_path).expect("migrate");
        assert!(first.created);
        assert_eq!(first.applied_now.len(), MIGRATIONS.len());
        let second = apply_embedded_migrations(&db_path).expect("migrate again");
        assert!(second.applied_now.is_empty());
        assert_eq!(second.skipped.len(), MIGRATIONS.len());
        assert_eq!(second.pending_total, 0);

        let after = inspect_status_at_path(&db_path).expect("status after");
        assert!(after.ready);
        assert!(after.schema_migrations_table_exists);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn analyses_keep_insertion_order_and_unknown_fields() {
        let db_path = create_temp_test_db();
        let db = LedgerDb::open(&db_path).expect("open");

        db.save_analysis_with_plan(&analysis("b", "Beatriz")).expect("save b");
        db.save_analysis_with_plan(&analysis("a", "Ana")).expect("save a");
        let mut b = analysis("b", "Beatriz");
        b.finished = true;
        db.save_analysis_with_plan(&b).expect("update b");

        let all = db.get_all_analyses().expect("load");
        let ids = all.iter().map(|a| a.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(all[0].finished);
        assert_eq!(all[1].extra.get("baralho"), Some(&json!("Rider-Waite")));

        db.delete_analysis("b").expect("delete");
        db.delete_analysis("missing").expect("delete missing is not an error");
        assert_eq!(db.get_all_analyses().expect("reload").len(), 1);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn blank_and_padded_ids_are_updated_in_place() {
        let db_path = create_temp_test_db();
        let db = LedgerDb::open(&db_path).expect("open");
        let conn = Connection::open(&db_path).expect("raw connection");
        for id in ["", " p1 "] {
            let payload = serde_json::to_string(&analysis(id, "Lia")).expect("payload");
            conn.execute(
                "INSERT INTO analyses(id, client_name, attendance_date, finished, payload) VALUES (?1, 'Lia', '2026-04-02', 0, ?2)",
                params![id, payload],
            )
            .expect("seed");
        }

        for id in ["", " p1 "] {
            let mut rec = analysis(id, "Lia");
            rec.finished = true;
            let saved = db.save_analysis_with_plan(&rec).expect("save");
            assert_eq!(saved.id, id);
        }
        let all = db.get_all_analyses().expect("load");
        let ids = all.iter().map(|a| a.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["", " p1 "]);
        assert!(all.iter().all(|a| a.finished));

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn finishing_an_analysis_writes_weekly_plans() {
        let db_path = create_temp_test_db();
        let db = LedgerDb::open(&db_path).expect("open");
        db.save_plans(&[PlanRecord {
            id: "other-week-1".to_string(),
            plan_type: "semanal".to_string(),
            ..Default::default()
        }])
        .expect("seed plans");

        let mut rec = analysis("w1", "Carla");
        rec.finished = true;
        rec.weekly_plan_active = true;
        rec.weekly_plan = Some(WeeklyPlanData {
            semanas: json!(3),
            valor_semanal: json!("25"),
        });
        db.save_analysis_with_plan(&rec).expect("save");

        let plans = db.get_plans().expect("plans");
        let ids = plans.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["other-week-1", "w1-week-1", "w1-week-2", "w1-week-3"]);
        assert_eq!(plans[1].due_date.as_deref(), Some("2026-04-09"));
        assert_eq!(plans[1].client_name.as_deref(), Some("Carla"));

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn save_plans_rejects_duplicate_ids_atomically() {
        let db_path = create_temp_test_db();
        let db = LedgerDb::open(&db_path).expect("open");
        let p = PlanRecord {
            id: "dup".to_string(),
            ..Default::default()
        };
        db.save_plans(&[p.clone()]).expect("seed");
        let err = db.save_plans(&[p.clone(), p]).expect_err("duplicate");
        assert!(err.contains("conflicts"), "unexpected error: {err}");
        assert_eq!(db.get_plans().expect("plans").len(), 1);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn birthday_check_uses_pinned_today() {
        let db_path = create_temp_test_db();
        let db = LedgerDb::open(&db_path)
            .expect("open")
            .with_today(NaiveDate::from_ymd_opt(2026, 5, 5).expect("date"));
        assert!(db.is_client_birthday_today("1990-05-05"));
        assert!(!db.is_client_birthday_today("1990-05-06"));
        let _ = fs::remove_file(&db_path);
    }
}
