//! Client-side derived views: free-text/stage filtering, sorting, and
//! the dashboard metric. Pure functions over already-fetched data; the
//! store never sees any of this.

use crate::models::{Job, JobStats, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageFilter {
    #[default]
    All,
    Only(Stage),
}

impl StageFilter {
    pub fn label(&self) -> &'static str {
        match self {
            StageFilter::All => "ALL",
            StageFilter::Only(stage) => stage.as_str(),
        }
    }

    /// Cycle ALL -> SAVED -> ... -> REJECTED -> ALL, for a single-key toggle.
    pub fn next(self) -> Self {
        match self {
            StageFilter::All => StageFilter::Only(Stage::ALL[0]),
            StageFilter::Only(stage) => {
                let i = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
                match Stage::ALL.get(i + 1) {
                    Some(next) => StageFilter::Only(*next),
                    None => StageFilter::All,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    UpdatedAt,
    Company,
    Title,
    Stage,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::UpdatedAt => "updated",
            SortKey::Company => "company",
            SortKey::Title => "title",
            SortKey::Stage => "stage",
        }
    }

    pub fn next(self) -> Self {
        match self {
            SortKey::UpdatedAt => SortKey::Company,
            SortKey::Company => SortKey::Title,
            SortKey::Title => SortKey::Stage,
            SortKey::Stage => SortKey::UpdatedAt,
        }
    }
}

/// Search matches case-insensitively on title OR company; the stage
/// filter must match exactly. Both conditions are ANDed.
pub fn matches(job: &Job, search: &str, filter: StageFilter) -> bool {
    let query = search.trim().to_lowercase();
    let matches_search = query.is_empty()
        || job.title.to_lowercase().contains(&query)
        || job.company.to_lowercase().contains(&query);
    let matches_stage = match filter {
        StageFilter::All => true,
        StageFilter::Only(stage) => job.current_stage == stage,
    };
    matches_search && matches_stage
}

/// Stable sort; ties keep their incoming relative order.
pub fn sort_jobs(jobs: &mut [Job], key: SortKey) {
    match key {
        // most recently touched first
        SortKey::UpdatedAt => jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        SortKey::Company => jobs.sort_by(|a, b| a.company.cmp(&b.company)),
        SortKey::Title => jobs.sort_by(|a, b| a.title.cmp(&b.title)),
        SortKey::Stage => {
            jobs.sort_by(|a, b| a.current_stage.as_str().cmp(b.current_stage.as_str()))
        }
    }
}

pub fn filter_and_sort(jobs: &[Job], search: &str, filter: StageFilter, key: SortKey) -> Vec<Job> {
    let mut out: Vec<Job> = jobs
        .iter()
        .filter(|job| matches(job, search, filter))
        .cloned()
        .collect();
    sort_jobs(&mut out, key);
    out
}

/// Share of applications still in play: (total - rejected) / total,
/// as a percentage. Zero when there is nothing tracked yet.
pub fn active_percent(stats: &JobStats) -> f64 {
    if stats.total_jobs == 0 {
        return 0.0;
    }
    let rejected = stats
        .jobs_by_stage
        .get(&Stage::Rejected)
        .copied()
        .unwrap_or(0);
    (stats.total_jobs - rejected) as f64 / stats.total_jobs as f64 * 100.0
}
