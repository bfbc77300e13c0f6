use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, SummaryError};
use crate::review::{NewReview, Ratings, Review, ReviewStore, TargetInfo};
use crate::summary::{check_advance, ReviewSummary, SummaryStore, SummaryUpdate};
use crate::target::SummaryTarget;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    title TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS instructors (
    id INTEGER PRIMARY KEY,
    full_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clubs (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT
);

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER,
    instructor_id INTEGER,
    club_id INTEGER,
    text TEXT NOT NULL DEFAULT '',
    instructor_rating REAL,
    difficulty REAL,
    recommendability REAL,
    enjoyability REAL,
    hours_per_week REAL,
    hidden INTEGER NOT NULL DEFAULT 0,
    toxicity REAL,
    semester TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
    CHECK (
        (club_id IS NOT NULL AND course_id IS NULL AND instructor_id IS NULL)
        OR (club_id IS NULL AND course_id IS NOT NULL AND instructor_id IS NOT NULL)
    )
);

CREATE INDEX IF NOT EXISTS idx_reviews_course_instructor ON reviews(course_id, instructor_id);
CREATE INDEX IF NOT EXISTS idx_reviews_club ON reviews(club_id);

CREATE TABLE IF NOT EXISTS review_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER,
    instructor_id INTEGER,
    club_id INTEGER,
    summary_text TEXT NOT NULL DEFAULT '',
    model TEXT,
    source_review_count INTEGER NOT NULL DEFAULT 0,
    last_review_id INTEGER,
    source_metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uniq_summary_course_instructor
    ON review_summaries(course_id, instructor_id) WHERE club_id IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS uniq_summary_club
    ON review_summaries(club_id) WHERE club_id IS NOT NULL;
"#;

/// `IS` compares NULLs as equal, so one clause covers both target shapes.
const TARGET_MATCH: &str = "course_id IS ?1 AND instructor_id IS ?2 AND club_id IS ?3";

const REVIEW_COLUMNS: &str = "id, course_id, instructor_id, club_id, text, instructor_rating, \
     difficulty, recommendability, enjoyability, hours_per_week, hidden, toxicity, semester, created_at";

const SUMMARY_COLUMNS: &str = "id, course_id, instructor_id, club_id, summary_text, model, \
     source_review_count, last_review_id, source_metadata, created_at, updated_at";

/// SQLite-backed review and summary store.
///
/// Writes to `review_summaries` run in `BEGIN IMMEDIATE` transactions so
/// the read-check-write in `persist` is atomic across processes sharing the
/// database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SummaryError::LockPoisoned(e.to_string()))
    }

    pub fn upsert_course(&self, id: i64, code: &str, title: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO courses (id, code, title) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET code = excluded.code, title = excluded.title",
            params![id, code, title],
        )?;
        Ok(())
    }

    pub fn upsert_instructor(&self, id: i64, full_name: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO instructors (id, full_name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET full_name = excluded.full_name",
            params![id, full_name],
        )?;
        Ok(())
    }

    pub fn upsert_club(&self, id: i64, name: &str, category: Option<&str>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO clubs (id, name, category) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, category = excluded.category",
            params![id, name, category],
        )?;
        Ok(())
    }

    /// Insert a review and return its id.
    pub fn insert_review(&self, review: &NewReview) -> Result<i64> {
        let conn = self.conn()?;
        let (course_id, instructor_id, club_id) = review.target.columns();
        let r = &review.ratings;
        conn.execute(
            "INSERT INTO reviews (course_id, instructor_id, club_id, text, instructor_rating,
                 difficulty, recommendability, enjoyability, hours_per_week, hidden, toxicity,
                 semester, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                course_id,
                instructor_id,
                club_id,
                review.text,
                r.instructor_rating,
                r.difficulty,
                r.recommendability,
                r.enjoyability,
                r.hours_per_week,
                review.hidden,
                review.toxicity,
                review.semester,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_hidden(&self, review_id: i64, hidden: bool) -> Result<()> {
        self.conn()?.execute(
            "UPDATE reviews SET hidden = ?2 WHERE id = ?1",
            params![review_id, hidden],
        )?;
        Ok(())
    }

    /// The stored `(course_id, instructor_id, club_id)` of a review, or `None`
    /// when no such review exists.
    pub fn review_columns(
        &self,
        review_id: i64,
    ) -> Result<Option<(Option<i64>, Option<i64>, Option<i64>)>> {
        let columns = self
            .conn()?
            .query_row(
                "SELECT course_id, instructor_id, club_id FROM reviews WHERE id = ?1",
                params![review_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(columns)
    }

    fn find_summary(conn: &Connection, target: &SummaryTarget) -> Result<Option<ReviewSummary>> {
        let (course_id, instructor_id, club_id) = target.columns();
        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM review_summaries WHERE {TARGET_MATCH}");
        let found = conn
            .query_row(&sql, params![course_id, instructor_id, club_id], summary_from_row)
            .optional()?;
        Ok(found)
    }
}

fn target_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<SummaryTarget> {
    let course_id: Option<i64> = row.get(offset)?;
    let instructor_id: Option<i64> = row.get(offset + 1)?;
    let club_id: Option<i64> = row.get(offset + 2)?;
    SummaryTarget::from_parts(course_id, instructor_id, club_id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(offset, rusqlite::types::Type::Integer, Box::new(e))
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        target: target_from_row(row, 1)?,
        text: row.get(4)?,
        ratings: Ratings {
            instructor_rating: row.get(5)?,
            difficulty: row.get(6)?,
            recommendability: row.get(7)?,
            enjoyability: row.get(8)?,
            hours_per_week: row.get(9)?,
        },
        hidden: row.get(10)?,
        toxicity: row.get(11)?,
        semester: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewSummary> {
    Ok(ReviewSummary {
        id: row.get(0)?,
        target: target_from_row(row, 1)?,
        summary_text: row.get(4)?,
        model: row.get(5)?,
        source_review_count: row.get(6)?,
        last_review_id: row.get(7)?,
        source_metadata: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl ReviewStore for SqliteStore {
    fn eligible_reviews(
        &self,
        target: &SummaryTarget,
        toxicity_threshold: f64,
    ) -> Result<Vec<Review>> {
        let conn = self.conn()?;
        let (course_id, instructor_id, club_id) = target.columns();
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews
             WHERE {TARGET_MATCH} AND hidden = 0 AND COALESCE(toxicity, 0) < ?4 AND TRIM(text) <> ''
             ORDER BY id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![course_id, instructor_id, club_id, toxicity_threshold],
            review_from_row,
        )?;

        let mut reviews = Vec::new();
        for review in rows {
            let review = review?;
            // Whitespace other than spaces survives SQL TRIM.
            if review.is_eligible(toxicity_threshold) {
                reviews.push(review);
            }
        }
        Ok(reviews)
    }

    fn describe(&self, target: &SummaryTarget) -> Result<Option<TargetInfo>> {
        let conn = self.conn()?;
        let info = match *target {
            SummaryTarget::CourseInstructor {
                course_id,
                instructor_id,
            } => conn
                .query_row(
                    "SELECT c.code, c.title, i.full_name
                     FROM courses c, instructors i
                     WHERE c.id = ?1 AND i.id = ?2",
                    params![course_id, instructor_id],
                    |row| {
                        Ok(TargetInfo::Course {
                            course_code: row.get(0)?,
                            course_title: row.get(1)?,
                            instructor_name: row.get(2)?,
                        })
                    },
                )
                .optional()?,
            SummaryTarget::Club { club_id } => conn
                .query_row(
                    "SELECT name, category FROM clubs WHERE id = ?1",
                    params![club_id],
                    |row| {
                        Ok(TargetInfo::Club {
                            name: row.get(0)?,
                            category: row.get(1)?,
                        })
                    },
                )
                .optional()?,
        };
        Ok(info)
    }

    fn targets(&self) -> Result<Vec<SummaryTarget>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT course_id, instructor_id, club_id FROM reviews
             ORDER BY club_id IS NOT NULL, course_id, instructor_id, club_id",
        )?;
        let rows = stmt.query_map([], |row| target_from_row(row, 0))?;
        let mut targets = Vec::new();
        for target in rows {
            targets.push(target?);
        }
        Ok(targets)
    }
}

impl SummaryStore for SqliteStore {
    fn ensure_record(&self, target: &SummaryTarget) -> Result<ReviewSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = Self::find_summary(&tx, target)? {
            tx.commit()?;
            return Ok(existing);
        }

        let (course_id, instructor_id, club_id) = target.columns();
        let now = Utc::now();
        tx.execute(
            "INSERT OR IGNORE INTO review_summaries
                 (course_id, instructor_id, club_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![course_id, instructor_id, club_id, now],
        )?;
        let created = Self::find_summary(&tx, target)?.ok_or_else(|| {
            SummaryError::Storage(rusqlite::Error::QueryReturnedNoRows)
        })?;
        tx.commit()?;

        log::debug!("{target}: created empty summary record {}", created.id);
        Ok(created)
    }

    fn get(&self, target: &SummaryTarget) -> Result<Option<ReviewSummary>> {
        let conn = self.conn()?;
        Self::find_summary(&conn, target)
    }

    fn persist(&self, record: &ReviewSummary, update: &SummaryUpdate) -> Result<ReviewSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = Self::find_summary(&tx, &record.target)?
            .ok_or_else(|| SummaryError::Storage(rusqlite::Error::QueryReturnedNoRows))?;
        check_advance(&stored, record, update)?;

        tx.execute(
            "UPDATE review_summaries
             SET summary_text = ?2, model = ?3, source_review_count = ?4,
                 last_review_id = ?5, source_metadata = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                stored.id,
                update.summary_text,
                update.model,
                update.source_review_count,
                update.last_review_id,
                update.source_metadata,
                update.updated_at,
            ],
        )?;
        tx.commit()?;

        let mut saved = stored;
        update.apply_to(&mut saved);
        Ok(saved)
    }

    fn list(&self) -> Result<Vec<ReviewSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM review_summaries ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], summary_from_row)?;
        let mut summaries = Vec::new();
        for summary in rows {
            summaries.push(summary?);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert_course(1, "CS 1110", "Intro to Computing").unwrap();
        store.upsert_instructor(2, "Alan Turing").unwrap();
        store.upsert_club(9, "Chess Club", Some("Games")).unwrap();
        store
    }

    #[test]
    fn filters_ineligible_reviews() {
        let store = seeded();
        let course = SummaryTarget::course(1, 2);
        store.insert_review(&NewReview::new(course, "Great")).unwrap();
        store.insert_review(&NewReview::new(course, "Hidden").hidden(true)).unwrap();
        store.insert_review(&NewReview::new(course, "Nasty").toxicity(0.9)).unwrap();
        store.insert_review(&NewReview::new(course, "  \n ")).unwrap();
        store.insert_review(&NewReview::new(SummaryTarget::club(9), "Fun")).unwrap();
        store.insert_review(&NewReview::new(course, "Also great")).unwrap();

        let eligible = store.eligible_reviews(&course, 0.5).unwrap();
        let texts: Vec<&str> = eligible.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Great", "Also great"]);
        assert!(eligible[0].id < eligible[1].id);
    }

    #[test]
    fn describes_targets() {
        let store = seeded();
        let info = store.describe(&SummaryTarget::course(1, 2)).unwrap().unwrap();
        assert_eq!(info.label(), "CS 1110 Intro to Computing (Alan Turing)");

        assert!(store.describe(&SummaryTarget::course(1, 3)).unwrap().is_none());
        assert!(store.describe(&SummaryTarget::club(9)).unwrap().is_some());
    }

    #[test]
    fn ensure_record_is_idempotent_per_target() {
        let store = seeded();
        let course = SummaryTarget::course(1, 2);
        let club = SummaryTarget::club(1);

        let first = store.ensure_record(&course).unwrap();
        let again = store.ensure_record(&course).unwrap();
        let other = store.ensure_record(&club).unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert!(!first.has_text());
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn persist_advances_and_rejects_stale_writes() {
        let store = seeded();
        let course = SummaryTarget::course(1, 2);
        let record = store.ensure_record(&course).unwrap();

        let update = SummaryUpdate {
            summary_text: "Clear and demanding.".into(),
            model: "gpt-4o-mini".into(),
            source_review_count: 5,
            last_review_id: 105,
            source_metadata: json!({"review_ids": [102, 103, 104, 105]}),
            updated_at: Utc::now(),
        };
        let saved = store.persist(&record, &update).unwrap();
        assert_eq!(saved.last_review_id, Some(105));

        let reloaded = store.get(&course).unwrap().unwrap();
        assert_eq!(reloaded.summary_text, "Clear and demanding.");
        assert_eq!(reloaded.source_review_count, 5);
        assert_eq!(reloaded.source_metadata["review_ids"][0], 102);

        // Written against the old snapshot: refused.
        let err = store.persist(&record, &update).unwrap_err();
        assert!(matches!(err, SummaryError::StaleWrite { .. }));

        // Backwards move: refused.
        let backwards = SummaryUpdate {
            last_review_id: 100,
            ..update
        };
        let err = store.persist(&reloaded, &backwards).unwrap_err();
        assert!(matches!(err, SummaryError::StaleWrite { .. }));
    }

    #[test]
    fn review_columns_report_the_stored_target() {
        let store = seeded();
        let id = store.insert_review(&NewReview::new(SummaryTarget::club(9), "Fun")).unwrap();

        assert_eq!(store.review_columns(id).unwrap(), Some((None, None, Some(9))));
        assert!(store.review_columns(id + 1).unwrap().is_none());
    }

    #[test]
    fn lists_distinct_targets() {
        let store = seeded();
        store.insert_review(&NewReview::new(SummaryTarget::club(9), "a")).unwrap();
        store.insert_review(&NewReview::new(SummaryTarget::course(1, 2), "b")).unwrap();
        store.insert_review(&NewReview::new(SummaryTarget::course(1, 2), "c")).unwrap();

        assert_eq!(
            store.targets().unwrap(),
            vec![SummaryTarget::course(1, 2), SummaryTarget::club(9)]
        );
    }
}
