mod client;
mod db;
mod models;
mod server;
mod service;
mod tui;
mod views;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use client::ApiClient;
use db::Database;
use models::{InterviewType, NewContact, NewInterview, NewJob, Stage};
use service::JobService;

#[derive(Parser)]
#[command(name = "pursuit")]
#[command(about = "Job application tracker - record postings, stages, contacts, and interviews")]
struct Cli {
    /// Path to the SQLite database (defaults to the user data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Run the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,
    },

    /// Browse the pipeline in an interactive terminal UI (talks to a running server)
    Browse {
        /// Base URL of the API server
        #[arg(long, default_value = "http://localhost:3001")]
        api: String,
    },

    /// Add a job application
    Add {
        /// Job title
        title: String,

        /// Company name
        #[arg(short, long)]
        company: String,

        #[arg(short, long)]
        location: Option<String>,

        /// Application date (defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Posting URL
        #[arg(short, long)]
        url: Option<String>,

        /// Resume version used
        #[arg(long)]
        resume: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        /// Initial stage (defaults to saved)
        #[arg(short, long)]
        stage: Option<String>,
    },

    /// List jobs
    List {
        /// Filter by stage (saved, applied, phone-screen, interview, offer, rejected)
        #[arg(short, long)]
        stage: Option<String>,
    },

    /// Show job details
    Show {
        /// Job ID
        id: i64,
    },

    /// Move a job to a new stage
    Stage {
        /// Job ID
        id: i64,

        /// New stage
        stage: String,
    },

    /// Delete a job and everything attached to it
    Delete {
        /// Job ID
        id: i64,
    },

    /// Show aggregate pipeline stats
    Stats,

    /// Manage contacts for a job
    Contact {
        #[command(subcommand)]
        command: ContactCommands,
    },

    /// Manage interviews for a job
    Interview {
        #[command(subcommand)]
        command: InterviewCommands,
    },
}

#[derive(Subcommand)]
enum ContactCommands {
    /// Add a contact to a job
    Add {
        /// Job ID
        job_id: i64,

        /// Contact name
        name: String,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(short, long)]
        phone: Option<String>,

        #[arg(short, long)]
        linkedin: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List contacts for a job
    List {
        /// Job ID
        job_id: i64,
    },

    /// Remove a contact
    Remove {
        /// Contact ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum InterviewCommands {
    /// Record an interview for a job
    Add {
        /// Job ID
        job_id: i64,

        /// Interview type (phone-screen, video-call, on-site, technical, behavioral, final-round)
        kind: String,

        /// When the interview is scheduled
        when: String,

        #[arg(short, long)]
        notes: Option<String>,

        /// Questions that came up
        #[arg(short, long)]
        questions: Option<String>,

        #[arg(short, long)]
        feedback: Option<String>,
    },

    /// List interviews for a job
    List {
        /// Job ID
        job_id: i64,
    },

    /// Remove an interview
    Remove {
        /// Interview ID
        id: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let db = Database::open(cli.db)?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Serve { port } => {
            let db = Database::open(cli.db)?;
            db.init()?;
            server::init_tracing();
            server::run(db, port)?;
        }

        Commands::Browse { api } => {
            let client = ApiClient::new(api);
            if let Err(e) = client.health() {
                eprintln!("Warning: {e:#}");
                eprintln!("Start the server with 'pursuit serve' and press r to retry inside the UI.");
            }
            tui::run_browse(&client)?;
        }

        Commands::Add {
            title,
            company,
            location,
            date,
            url,
            resume,
            notes,
            stage,
        } => {
            let service = open_service(cli.db)?;
            let current_stage = stage.as_deref().map(Stage::parse_flexible).transpose()?;
            let job = service.create_job(NewJob {
                title,
                company,
                location,
                application_date: date,
                job_url: url,
                resume_used: resume,
                notes,
                current_stage,
            })?;
            println!("Added job #{} ({} at {})", job.id, job.title, job.company);
        }

        Commands::List { stage } => {
            let service = open_service(cli.db)?;
            let jobs = match stage.as_deref() {
                Some(s) => service.list_by_stage(Stage::parse_flexible(s)?)?,
                None => service.list_jobs()?,
            };
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<6} {:<14} {:<30} {:<20} {:<12}",
                    "ID", "STAGE", "TITLE", "COMPANY", "UPDATED"
                );
                println!("{}", "-".repeat(84));
                for job in jobs {
                    println!(
                        "{:<6} {:<14} {:<30} {:<20} {:<12}",
                        job.id,
                        job.current_stage,
                        truncate(&job.title, 28),
                        truncate(&job.company, 18),
                        job.updated_at.get(..10).unwrap_or(&job.updated_at)
                    );
                }
            }
        }

        Commands::Show { id } => {
            let service = open_service(cli.db)?;
            let job = service.get_job(id)?;
            println!("Job #{}", job.id);
            println!("Title: {}", job.title);
            println!("Company: {}", job.company);
            println!("Stage: {}", job.current_stage);
            if let Some(location) = &job.location {
                println!("Location: {}", location);
            }
            println!("Applied: {}", job.application_date);
            if let Some(url) = &job.job_url {
                println!("URL: {}", url);
            }
            if let Some(resume) = &job.resume_used {
                println!("Resume: {}", resume);
            }
            println!("Created: {}", job.created_at);
            println!("Updated: {}", job.updated_at);
            if let Some(notes) = &job.notes {
                println!("\nNotes:\n{}", notes);
            }
            if !job.contacts.is_empty() {
                println!("\nContacts ({}):", job.contacts.len());
                for contact in &job.contacts {
                    let role = contact.role.as_deref().unwrap_or("-");
                    println!("  #{} {} ({})", contact.id, contact.name, role);
                }
            }
            if !job.interviews.is_empty() {
                println!("\nInterviews ({}):", job.interviews.len());
                for interview in &job.interviews {
                    println!(
                        "  #{} {} at {}",
                        interview.id, interview.kind, interview.scheduled_at
                    );
                }
            }
        }

        Commands::Stage { id, stage } => {
            let service = open_service(cli.db)?;
            let stage = Stage::parse_flexible(&stage)?;
            let job = service.update_stage(id, stage)?;
            println!("Job #{} moved to {}", job.id, job.current_stage);
        }

        Commands::Delete { id } => {
            let service = open_service(cli.db)?;
            service.delete_job(id)?;
            println!("Deleted job #{} and its contacts/interviews.", id);
        }

        Commands::Stats => {
            let service = open_service(cli.db)?;
            let stats = service.get_stats()?;
            println!("Total jobs: {}", stats.total_jobs);
            for (stage, count) in &stats.jobs_by_stage {
                println!("  {:<14} {}", stage.as_str(), count);
            }
            println!("Active: {:.0}%", views::active_percent(&stats));
        }

        Commands::Contact { command } => {
            let service = open_service(cli.db)?;
            match command {
                ContactCommands::Add {
                    job_id,
                    name,
                    role,
                    email,
                    phone,
                    linkedin,
                    notes,
                } => {
                    let contact = service.add_contact(
                        job_id,
                        NewContact {
                            name,
                            role,
                            email,
                            phone,
                            linkedin,
                            notes,
                        },
                    )?;
                    println!("Added contact #{} to job #{}", contact.id, job_id);
                }

                ContactCommands::List { job_id } => {
                    let contacts = service.list_contacts(job_id)?;
                    if contacts.is_empty() {
                        println!("No contacts for job #{}.", job_id);
                    } else {
                        println!("{:<6} {:<24} {:<20} {:<24}", "ID", "NAME", "ROLE", "EMAIL");
                        println!("{}", "-".repeat(76));
                        for contact in contacts {
                            println!(
                                "{:<6} {:<24} {:<20} {:<24}",
                                contact.id,
                                truncate(&contact.name, 22),
                                truncate(contact.role.as_deref().unwrap_or("-"), 18),
                                truncate(contact.email.as_deref().unwrap_or("-"), 22)
                            );
                        }
                    }
                }

                ContactCommands::Remove { id } => {
                    service.delete_contact(id)?;
                    println!("Removed contact #{}.", id);
                }
            }
        }

        Commands::Interview { command } => {
            let service = open_service(cli.db)?;
            match command {
                InterviewCommands::Add {
                    job_id,
                    kind,
                    when,
                    notes,
                    questions,
                    feedback,
                } => {
                    let kind = InterviewType::parse_flexible(&kind)?;
                    let interview = service.add_interview(
                        job_id,
                        NewInterview {
                            kind,
                            scheduled_at: when,
                            notes,
                            questions_asked: questions,
                            feedback,
                        },
                    )?;
                    println!(
                        "Recorded {} interview #{} for job #{}",
                        interview.kind, interview.id, job_id
                    );
                }

                InterviewCommands::List { job_id } => {
                    let interviews = service.list_interviews(job_id)?;
                    if interviews.is_empty() {
                        println!("No interviews for job #{}.", job_id);
                    } else {
                        println!("{:<6} {:<14} {:<24} {:<24}", "ID", "TYPE", "SCHEDULED", "FEEDBACK");
                        println!("{}", "-".repeat(70));
                        for interview in interviews {
                            println!(
                                "{:<6} {:<14} {:<24} {:<24}",
                                interview.id,
                                interview.kind,
                                truncate(&interview.scheduled_at, 22),
                                truncate(interview.feedback.as_deref().unwrap_or("-"), 22)
                            );
                        }
                    }
                }

                InterviewCommands::Remove { id } => {
                    service.delete_interview(id)?;
                    println!("Removed interview #{}.", id);
                }
            }
        }
    }

    Ok(())
}

fn open_service(db_path: Option<PathBuf>) -> Result<JobService> {
    let db = Database::open(db_path)?;
    db.ensure_initialized()?;
    Ok(JobService::new(db))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
