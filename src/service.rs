use thiserror::Error;

use crate::db::Database;
use crate::models::{
    now_utc, Contact, Interview, Job, JobPatch, JobStats, NewContact, NewInterview, NewJob, Patch,
    Stage,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

fn validation(msg: &str) -> ServiceError {
    ServiceError::Validation(msg.to_string())
}

/// Trim an optional input, mapping whitespace-only values to None.
fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Business rules over the store: validation, defaulting, and the
/// partial-update semantics the schema cannot express.
pub struct JobService {
    db: Database,
}

impl JobService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Jobs ---

    pub fn create_job(&self, input: NewJob) -> ServiceResult<Job> {
        let title = input.title.trim().to_string();
        let company = input.company.trim().to_string();
        if title.is_empty() || company.is_empty() {
            return Err(validation("Title and company are required"));
        }

        let application_date = normalize(input.application_date).unwrap_or_else(now_utc);
        let stage = input.current_stage.unwrap_or(Stage::Saved);
        let location = normalize(input.location);
        let job_url = normalize(input.job_url);
        let resume_used = normalize(input.resume_used);
        let notes = normalize(input.notes);

        let id = self.db.insert_job(
            &title,
            &company,
            location.as_deref(),
            &application_date,
            job_url.as_deref(),
            resume_used.as_deref(),
            notes.as_deref(),
            stage,
        )?;
        self.get_job(id)
    }

    pub fn get_job(&self, id: i64) -> ServiceResult<Job> {
        self.db.get_job(id)?.ok_or(ServiceError::NotFound("Job"))
    }

    pub fn list_jobs(&self) -> ServiceResult<Vec<Job>> {
        Ok(self.db.list_jobs()?)
    }

    pub fn list_by_stage(&self, stage: Stage) -> ServiceResult<Vec<Job>> {
        Ok(self.db.list_jobs_by_stage(stage)?)
    }

    /// Partial update. Fields absent from the patch keep their stored
    /// value; explicit null or an empty string clears optional fields.
    /// Required fields (title, company, application date, stage) cannot
    /// be cleared, only replaced.
    pub fn update_job(&self, id: i64, patch: JobPatch) -> ServiceResult<Job> {
        let mut job = self.get_job(id)?;

        match patch.title {
            Patch::Keep => {}
            Patch::Clear => return Err(validation("Title cannot be empty")),
            Patch::Set(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(validation("Title cannot be empty"));
                }
                job.title = trimmed.to_string();
            }
        }
        match patch.company {
            Patch::Keep => {}
            Patch::Clear => return Err(validation("Company cannot be empty")),
            Patch::Set(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(validation("Company cannot be empty"));
                }
                job.company = trimmed.to_string();
            }
        }
        match patch.application_date {
            Patch::Keep => {}
            Patch::Clear => return Err(validation("Application date cannot be empty")),
            Patch::Set(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(validation("Application date cannot be empty"));
                }
                job.application_date = trimmed.to_string();
            }
        }
        match patch.current_stage {
            Patch::Keep => {}
            Patch::Clear => return Err(validation("Invalid job stage")),
            Patch::Set(stage) => job.current_stage = stage,
        }

        apply_optional(&mut job.location, patch.location);
        apply_optional(&mut job.job_url, patch.job_url);
        apply_optional(&mut job.resume_used, patch.resume_used);
        apply_optional(&mut job.notes, patch.notes);

        self.db.update_job_row(&job)?;
        self.get_job(id)
    }

    pub fn update_stage(&self, id: i64, stage: Stage) -> ServiceResult<Job> {
        self.update_job(
            id,
            JobPatch {
                current_stage: Patch::Set(stage),
                ..Default::default()
            },
        )
    }

    pub fn delete_job(&self, id: i64) -> ServiceResult<()> {
        if !self.db.delete_job(id)? {
            return Err(ServiceError::NotFound("Job"));
        }
        Ok(())
    }

    pub fn get_stats(&self) -> ServiceResult<JobStats> {
        Ok(self.db.stage_counts()?)
    }

    // --- Contacts ---

    pub fn add_contact(&self, job_id: i64, input: NewContact) -> ServiceResult<Contact> {
        self.get_job(job_id)?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(validation("Contact name is required"));
        }
        let role = normalize(input.role);
        let email = normalize(input.email);
        let phone = normalize(input.phone);
        let linkedin = normalize(input.linkedin);
        let notes = normalize(input.notes);
        let id = self.db.insert_contact(
            job_id,
            &name,
            role.as_deref(),
            email.as_deref(),
            phone.as_deref(),
            linkedin.as_deref(),
            notes.as_deref(),
        )?;
        self.db.get_contact(id)?.ok_or(ServiceError::NotFound("Contact"))
    }

    pub fn list_contacts(&self, job_id: i64) -> ServiceResult<Vec<Contact>> {
        self.get_job(job_id)?;
        Ok(self.db.list_contacts(job_id)?)
    }

    pub fn delete_contact(&self, id: i64) -> ServiceResult<()> {
        if !self.db.delete_contact(id)? {
            return Err(ServiceError::NotFound("Contact"));
        }
        Ok(())
    }

    // --- Interviews ---

    pub fn add_interview(&self, job_id: i64, input: NewInterview) -> ServiceResult<Interview> {
        self.get_job(job_id)?;
        let scheduled_at = input.scheduled_at.trim().to_string();
        if scheduled_at.is_empty() {
            return Err(validation("Interview schedule is required"));
        }
        let notes = normalize(input.notes);
        let questions_asked = normalize(input.questions_asked);
        let feedback = normalize(input.feedback);
        let id = self.db.insert_interview(
            job_id,
            input.kind,
            &scheduled_at,
            notes.as_deref(),
            questions_asked.as_deref(),
            feedback.as_deref(),
        )?;
        self.db
            .get_interview(id)?
            .ok_or(ServiceError::NotFound("Interview"))
    }

    pub fn list_interviews(&self, job_id: i64) -> ServiceResult<Vec<Interview>> {
        self.get_job(job_id)?;
        Ok(self.db.list_interviews(job_id)?)
    }

    pub fn delete_interview(&self, id: i64) -> ServiceResult<()> {
        if !self.db.delete_interview(id)? {
            return Err(ServiceError::NotFound("Interview"));
        }
        Ok(())
    }
}

fn apply_optional(field: &mut Option<String>, patch: Patch<String>) {
    match patch {
        Patch::Keep => {}
        Patch::Clear => *field = None,
        Patch::Set(value) => *field = normalize(Some(value)),
    }
}
