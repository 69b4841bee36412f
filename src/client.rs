//! Blocking HTTP client for the tracker API. The terminal UI goes
//! through this exclusively; it never touches the database file.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;

use crate::models::{Job, JobPatch, JobStats, NewJob, Stage};

pub struct ApiClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::new();
        Self { base_url, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into an error carrying the API's own
    /// message when the body has one.
    fn check(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Err(anyhow!("API error ({}): {}", status.as_u16(), message))
    }

    pub fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?;
        Ok(())
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let response = self
            .client
            .get(self.url("/jobs"))
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?
            .json()
            .context("Failed to parse job list")
    }

    #[allow(dead_code)]
    pub fn get_job(&self, id: i64) -> Result<Job> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{id}")))
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?.json().context("Failed to parse job")
    }

    pub fn create_job(&self, input: &NewJob) -> Result<Job> {
        let response = self
            .client
            .post(self.url("/jobs"))
            .json(input)
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?.json().context("Failed to parse job")
    }

    pub fn update_job(&self, id: i64, patch: &JobPatch) -> Result<Job> {
        let response = self
            .client
            .put(self.url(&format!("/jobs/{id}")))
            .json(patch)
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?.json().context("Failed to parse job")
    }

    pub fn update_stage(&self, id: i64, stage: Stage) -> Result<Job> {
        let response = self
            .client
            .patch(self.url(&format!("/jobs/{id}/stage")))
            .json(&json!({ "stage": stage.as_str() }))
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?.json().context("Failed to parse job")
    }

    pub fn delete_job(&self, id: i64) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/jobs/{id}")))
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?;
        Ok(())
    }

    #[allow(dead_code)]
    pub fn list_by_stage(&self, stage: Stage) -> Result<Vec<Job>> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/stage/{}", stage.as_str())))
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?
            .json()
            .context("Failed to parse job list")
    }

    pub fn stats(&self) -> Result<JobStats> {
        let response = self
            .client
            .get(self.url("/jobs/stats"))
            .send()
            .with_context(|| format!("Cannot reach the server at {}", self.base_url))?;
        Self::check(response)?
            .json()
            .context("Failed to parse stats")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Patch;
    use crate::server;
    use std::time::Duration;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:3001/");
        assert_eq!(client.url("/jobs"), "http://localhost:3001/jobs");
    }

    /// Spin up the real server on an ephemeral port and drive every
    /// endpoint through the client.
    #[test]
    fn test_round_trip_against_live_server() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let app = server::app(db);

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });

        let client = ApiClient::new(format!("http://{addr}"));
        let mut ready = false;
        for _ in 0..50 {
            if client.health().is_ok() {
                ready = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(ready, "server did not come up");

        let job = client
            .create_job(&NewJob {
                title: "Backend Engineer".to_string(),
                company: "Acme".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(job.current_stage, Stage::Saved);

        let fetched = client.get_job(job.id).unwrap();
        assert_eq!(fetched.title, "Backend Engineer");

        let updated = client
            .update_job(
                job.id,
                &JobPatch {
                    notes: Patch::Set("intro call done".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("intro call done"));

        let moved = client.update_stage(job.id, Stage::Applied).unwrap();
        assert_eq!(moved.current_stage, Stage::Applied);

        let applied = client.list_by_stage(Stage::Applied).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(client.list_jobs().unwrap().len(), 1);

        let stats = client.stats().unwrap();
        assert_eq!(stats.total_jobs, 1);
        assert_eq!(stats.jobs_by_stage.get(&Stage::Applied), Some(&1));

        client.delete_job(job.id).unwrap();
        let err = client.get_job(job.id).unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
