use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{Contact, Interview, InterviewType, Job, JobStats, Stage};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path_override: Option<PathBuf>) -> Result<Self> {
        let path = match path_override {
            Some(p) => p,
            None => Self::default_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        // SQLite leaves FK enforcement off unless asked; cascade depends on it.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn, path })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "pursuit") {
            Ok(proj_dirs.data_dir().join("pursuit.db"))
        } else {
            Ok(PathBuf::from("pursuit.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT,
                application_date TEXT NOT NULL,
                job_url TEXT,
                resume_used TEXT,
                notes TEXT,
                current_stage TEXT NOT NULL DEFAULT 'SAVED'
                    CHECK (current_stage IN ('SAVED', 'APPLIED', 'PHONE_SCREEN', 'INTERVIEW', 'OFFER', 'REJECTED')),
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                role TEXT,
                email TEXT,
                phone TEXT,
                linkedin TEXT,
                notes TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE TABLE IF NOT EXISTS interviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                type TEXT NOT NULL
                    CHECK (type IN ('PHONE_SCREEN', 'VIDEO_CALL', 'ON_SITE', 'TECHNICAL', 'BEHAVIORAL', 'FINAL_ROUND')),
                scheduled_at TEXT NOT NULL,
                notes TEXT,
                questions_asked TEXT,
                feedback TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_stage ON jobs(current_stage);
            CREATE INDEX IF NOT EXISTS idx_contacts_job ON contacts(job_id);
            CREATE INDEX IF NOT EXISTS idx_interviews_job ON interviews(job_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='jobs'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'pursuit init' first."));
        }
        Ok(())
    }

    // --- Job operations ---

    #[allow(clippy::too_many_arguments)]
    pub fn insert_job(
        &self,
        title: &str,
        company: &str,
        location: Option<&str>,
        application_date: &str,
        job_url: Option<&str>,
        resume_used: Option<&str>,
        notes: Option<&str>,
        stage: Stage,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO jobs (title, company, location, application_date, job_url, resume_used, notes, current_stage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![title, company, location, application_date, job_url, resume_used, notes, stage],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, company, location, application_date, job_url, resume_used, notes,
                    current_stage, created_at, updated_at
             FROM jobs
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], Self::row_to_job)?;
        let mut jobs = rows
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs")?;
        self.attach_children(&mut jobs)?;
        Ok(jobs)
    }

    pub fn list_jobs_by_stage(&self, stage: Stage) -> Result<Vec<Job>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, company, location, application_date, job_url, resume_used, notes,
                    current_stage, created_at, updated_at
             FROM jobs
             WHERE current_stage = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([stage], Self::row_to_job)?;
        let mut jobs = rows
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list jobs by stage")?;
        self.attach_children(&mut jobs)?;
        Ok(jobs)
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let result = self.conn.query_row(
            "SELECT id, title, company, location, application_date, job_url, resume_used, notes,
                    current_stage, created_at, updated_at
             FROM jobs WHERE id = ?1",
            [id],
            Self::row_to_job,
        );
        match result {
            Ok(job) => {
                let mut jobs = vec![job];
                self.attach_children(&mut jobs)?;
                Ok(jobs.pop())
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write back every mutable column of a job and refresh updated_at.
    pub fn update_job_row(&self, job: &Job) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET title = ?1, company = ?2, location = ?3, application_date = ?4,
                             job_url = ?5, resume_used = ?6, notes = ?7, current_stage = ?8,
                             updated_at = strftime('%Y-%m-%d %H:%M:%f', 'now')
             WHERE id = ?9",
            params![
                job.title,
                job.company,
                job.location,
                job.application_date,
                job.job_url,
                job.resume_used,
                job.notes,
                job.current_stage,
                job.id
            ],
        )?;
        Ok(())
    }

    /// Returns false when no row matched. Child rows go with the job
    /// through ON DELETE CASCADE, in the same statement.
    pub fn delete_job(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Total job count and per-stage counts, read inside one transaction
    /// so the two numbers come from the same snapshot.
    pub fn stage_counts(&self) -> Result<JobStats> {
        let tx = self.conn.unchecked_transaction()?;
        let total_jobs: i64 = tx.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        let mut stats = JobStats {
            total_jobs,
            ..Default::default()
        };
        {
            let mut stmt =
                tx.prepare("SELECT current_stage, COUNT(*) FROM jobs GROUP BY current_stage")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, Stage>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (stage, count) = row?;
                stats.jobs_by_stage.insert(stage, count);
            }
        }
        tx.commit()?;
        Ok(stats)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        Ok(Job {
            id: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            location: row.get(3)?,
            application_date: row.get(4)?,
            job_url: row.get(5)?,
            resume_used: row.get(6)?,
            notes: row.get(7)?,
            current_stage: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            contacts: Vec::new(),
            interviews: Vec::new(),
        })
    }

    /// Load contacts and interviews for every job in the slice. Two bulk
    /// queries bucketed by job_id rather than a pair per job.
    fn attach_children(&self, jobs: &mut [Job]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let index: HashMap<i64, usize> = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (job.id, i))
            .collect();

        let mut stmt = self.conn.prepare(
            "SELECT id, name, role, email, phone, linkedin, notes, job_id, created_at, updated_at
             FROM contacts ORDER BY id",
        )?;
        let contacts = stmt.query_map([], Self::row_to_contact)?;
        for contact in contacts {
            let contact = contact?;
            if let Some(&i) = index.get(&contact.job_id) {
                jobs[i].contacts.push(contact);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, type, scheduled_at, notes, questions_asked, feedback, job_id, created_at, updated_at
             FROM interviews ORDER BY id",
        )?;
        let interviews = stmt.query_map([], Self::row_to_interview)?;
        for interview in interviews {
            let interview = interview?;
            if let Some(&i) = index.get(&interview.job_id) {
                jobs[i].interviews.push(interview);
            }
        }
        Ok(())
    }

    // --- Contact operations ---

    #[allow(clippy::too_many_arguments)]
    pub fn insert_contact(
        &self,
        job_id: i64,
        name: &str,
        role: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
        linkedin: Option<&str>,
        notes: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO contacts (job_id, name, role, email, phone, linkedin, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![job_id, name, role, email, phone, linkedin, notes],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_contact(&self, id: i64) -> Result<Option<Contact>> {
        let result = self.conn.query_row(
            "SELECT id, name, role, email, phone, linkedin, notes, job_id, created_at, updated_at
             FROM contacts WHERE id = ?1",
            [id],
            Self::row_to_contact,
        );
        match result {
            Ok(contact) => Ok(Some(contact)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_contacts(&self, job_id: i64) -> Result<Vec<Contact>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, role, email, phone, linkedin, notes, job_id, created_at, updated_at
             FROM contacts WHERE job_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([job_id], Self::row_to_contact)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list contacts")
    }

    pub fn delete_contact(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM contacts WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
        Ok(Contact {
            id: row.get(0)?,
            name: row.get(1)?,
            role: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            linkedin: row.get(5)?,
            notes: row.get(6)?,
            job_id: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // --- Interview operations ---

    pub fn insert_interview(
        &self,
        job_id: i64,
        kind: InterviewType,
        scheduled_at: &str,
        notes: Option<&str>,
        questions_asked: Option<&str>,
        feedback: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO interviews (job_id, type, scheduled_at, notes, questions_asked, feedback)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![job_id, kind, scheduled_at, notes, questions_asked, feedback],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_interview(&self, id: i64) -> Result<Option<Interview>> {
        let result = self.conn.query_row(
            "SELECT id, type, scheduled_at, notes, questions_asked, feedback, job_id, created_at, updated_at
             FROM interviews WHERE id = ?1",
            [id],
            Self::row_to_interview,
        );
        match result {
            Ok(interview) => Ok(Some(interview)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_interviews(&self, job_id: i64) -> Result<Vec<Interview>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, type, scheduled_at, notes, questions_asked, feedback, job_id, created_at, updated_at
             FROM interviews WHERE job_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([job_id], Self::row_to_interview)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list interviews")
    }

    pub fn delete_interview(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM interviews WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    fn row_to_interview(row: &rusqlite::Row) -> rusqlite::Result<Interview> {
        Ok(Interview {
            id: row.get(0)?,
            kind: row.get(1)?,
            scheduled_at: row.get(2)?,
            notes: row.get(3)?,
            questions_asked: row.get(4)?,
            feedback: row.get(5)?,
            job_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_utc;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn add_job(db: &Database, title: &str, company: &str, stage: Stage) -> i64 {
        db.insert_job(title, company, None, &now_utc(), None, None, None, stage)
            .unwrap()
    }

    #[test]
    fn test_insert_and_get_job() {
        let db = test_db();
        let id = add_job(&db, "Backend Engineer", "Acme", Stage::Saved);
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.title, "Backend Engineer");
        assert_eq!(job.company, "Acme");
        assert_eq!(job.current_stage, Stage::Saved);
        assert!(job.contacts.is_empty());
        assert!(job.interviews.is_empty());
    }

    #[test]
    fn test_get_missing_job_is_none() {
        let db = test_db();
        assert!(db.get_job(42).unwrap().is_none());
    }

    #[test]
    fn test_list_jobs_newest_first() {
        let db = test_db();
        let first = add_job(&db, "First", "A", Stage::Saved);
        let second = add_job(&db, "Second", "B", Stage::Saved);
        let third = add_job(&db, "Third", "C", Stage::Saved);
        let ids: Vec<i64> = db.list_jobs().unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![third, second, first]);
    }

    #[test]
    fn test_children_attach_to_the_right_job() {
        let db = test_db();
        let a = add_job(&db, "A", "A Corp", Stage::Applied);
        let b = add_job(&db, "B", "B Corp", Stage::Applied);
        db.insert_contact(a, "Alice", Some("Recruiter"), None, None, None, None)
            .unwrap();
        db.insert_contact(b, "Bob", None, None, None, None, None).unwrap();
        db.insert_interview(b, InterviewType::Technical, "2026-08-10 14:00:00.000", None, None, None)
            .unwrap();

        let jobs = db.list_jobs().unwrap();
        let job_a = jobs.iter().find(|j| j.id == a).unwrap();
        let job_b = jobs.iter().find(|j| j.id == b).unwrap();
        assert_eq!(job_a.contacts.len(), 1);
        assert_eq!(job_a.contacts[0].name, "Alice");
        assert!(job_a.interviews.is_empty());
        assert_eq!(job_b.contacts.len(), 1);
        assert_eq!(job_b.interviews.len(), 1);
        assert_eq!(job_b.interviews[0].kind, InterviewType::Technical);
    }

    #[test]
    fn test_delete_job_cascades_to_children() {
        let db = test_db();
        let id = add_job(&db, "Platform Engineer", "Initech", Stage::Interview);
        db.insert_contact(id, "Carol", None, None, None, None, None).unwrap();
        db.insert_interview(id, InterviewType::OnSite, "2026-08-12 09:00:00.000", None, None, None)
            .unwrap();

        assert!(db.delete_job(id).unwrap());
        assert!(db.get_job(id).unwrap().is_none());

        let orphan_contacts: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .unwrap();
        let orphan_interviews: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM interviews", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphan_contacts, 0);
        assert_eq!(orphan_interviews, 0);
    }

    #[test]
    fn test_delete_missing_job_reports_no_match() {
        let db = test_db();
        assert!(!db.delete_job(7).unwrap());
    }

    #[test]
    fn test_stage_counts_skip_empty_stages() {
        let db = test_db();
        add_job(&db, "A", "A", Stage::Saved);
        add_job(&db, "B", "B", Stage::Saved);
        add_job(&db, "C", "C", Stage::Rejected);

        let stats = db.stage_counts().unwrap();
        assert_eq!(stats.total_jobs, 3);
        assert_eq!(stats.jobs_by_stage.get(&Stage::Saved), Some(&2));
        assert_eq!(stats.jobs_by_stage.get(&Stage::Rejected), Some(&1));
        assert!(!stats.jobs_by_stage.contains_key(&Stage::Offer));
        assert_eq!(stats.jobs_by_stage.values().sum::<i64>(), stats.total_jobs);
    }

    #[test]
    fn test_list_by_stage_matches_filtered_list() {
        let db = test_db();
        add_job(&db, "A", "A", Stage::Applied);
        add_job(&db, "B", "B", Stage::Saved);
        add_job(&db, "C", "C", Stage::Applied);

        let by_stage: Vec<i64> = db
            .list_jobs_by_stage(Stage::Applied)
            .unwrap()
            .iter()
            .map(|j| j.id)
            .collect();
        let filtered: Vec<i64> = db
            .list_jobs()
            .unwrap()
            .iter()
            .filter(|j| j.current_stage == Stage::Applied)
            .map(|j| j.id)
            .collect();
        assert_eq!(by_stage, filtered);
    }

    #[test]
    fn test_check_constraint_rejects_unknown_stage_text() {
        let db = test_db();
        let result = db.conn.execute(
            "INSERT INTO jobs (title, company, application_date, current_stage) VALUES ('x', 'y', 'z', 'HIRED')",
            [],
        );
        assert!(result.is_err());
    }
}
