use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, RepoCommands};
use config::Config;

use silent_refactor::analysis::AnthropicAnalysisClient;
use silent_refactor::codehost::GitHubClient;
use silent_refactor::domain::{JobStatus, Repository};
use silent_refactor::monitor::Monitor;
use silent_refactor::queue::{JobQueue, enqueue_if_idle};
use silent_refactor::review::{AnalysisClassifier, PrReviewer};
use silent_refactor::scheduler::{CycleReport, RateLimiter, run_scan_cycle, run_worker};
use silent_refactor::storage::{JobStore, JsonlStorage, RepositoryStore};
use silent_refactor::webhook::{WebhookHandler, WebhookOutcome};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("silent-refactor")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("silent-refactor.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_storage(config: &Config) -> Result<Arc<JsonlStorage>> {
    let storage = JsonlStorage::new(&config.storage.data_dir)
        .context(format!("Failed to open storage at {}", config.storage.data_dir.display()))?;
    Ok(Arc::new(storage))
}

/// Clients and limiter shared by the queue and the reviewer.
struct Collaborators {
    host: Arc<GitHubClient>,
    analysis: Arc<AnthropicAnalysisClient>,
    limiter: Arc<RateLimiter>,
}

fn collaborators(config: &Config) -> Result<Collaborators> {
    let host = GitHubClient::from_env(&config.github.token_env, config.github_config())
        .context("Failed to create GitHub client")?;
    let analysis = AnthropicAnalysisClient::from_env(&config.analysis.api_key_env, config.anthropic_config())
        .context("Failed to create analysis client")?;
    Ok(Collaborators {
        host: Arc::new(host),
        analysis: Arc::new(analysis),
        limiter: Arc::new(RateLimiter::new(config.rate_limit_config())),
    })
}

fn build_queue(config: &Config, storage: Arc<JsonlStorage>) -> Result<JobQueue<JsonlStorage>> {
    let c = collaborators(config)?;
    Ok(JobQueue::new(
        storage,
        c.host,
        c.analysis,
        c.limiter,
        config.pipeline_config(),
        config.job_queue_config(),
    ))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let storage = open_storage(config)?;

    match &cli.command {
        Commands::Repo { command } => handle_repo_command(command, &storage),
        Commands::Enqueue { repository_id } => handle_enqueue_command(repository_id, config, &storage),
        Commands::Sweep => handle_sweep_command(config, storage).await,
        Commands::Work { max_jobs } => handle_work_command(*max_jobs, config, storage).await,
        Commands::Review { owner, repo, pr } => handle_review_command(owner, repo, *pr, config).await,
        Commands::Close { owner, repo, pr } => handle_close_command(owner, repo, *pr, config).await,
        Commands::Jobs { status } => handle_jobs_command(status.as_deref(), &storage),
        Commands::Stats => handle_stats_command(storage),
        Commands::Webhook {
            payload,
            signature,
            event,
        } => handle_webhook_command(payload, signature, event.as_deref(), config, &storage),
    }
}

fn handle_repo_command(command: &RepoCommands, storage: &JsonlStorage) -> Result<()> {
    let repositories = RepositoryStore::new(storage);
    match command {
        RepoCommands::Add { url } => {
            info!("Registering repository: {}", url);
            if let Some(existing) = repositories.find_by_url(url)? {
                println!("{} {} ({})", "Already registered:".yellow(), existing.full_name(), existing.id);
                return Ok(());
            }
            let repository = Repository::from_url(url)?;
            repositories.create(&repository)?;
            println!("{} {} ({})", "Registered:".green(), repository.full_name(), repository.id);
        }
        RepoCommands::List => {
            let all = repositories.list_all()?;
            if all.is_empty() {
                println!("{}", "No repositories registered".yellow());
            }
            for repository in all {
                let last_scan = repository
                    .last_scan_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  {:<32} {:<9} prs={:<3} issues={:<4} last scan: {}",
                    repository.id.dimmed(),
                    repository.full_name(),
                    format!("{:?}", repository.status).to_lowercase(),
                    repository.open_prs,
                    repository.issues_found,
                    last_scan
                );
            }
        }
    }
    Ok(())
}

fn handle_enqueue_command(repository_id: &str, config: &Config, storage: &JsonlStorage) -> Result<()> {
    info!("Enqueue requested for repository: {}", repository_id);
    if RepositoryStore::new(storage).get(repository_id)?.is_none() {
        return Err(eyre!("Unknown repository: {}", repository_id));
    }
    match enqueue_if_idle(storage, repository_id, config.jobs.max_attempts)? {
        Some(job) => println!("{} {}", "Queued:".green(), job.id),
        None => println!("{}", "Repository already has an active job".yellow()),
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "{} enqueued={} skipped={} completed={} requeued={} failed={} errored={} recovered={}",
        "Cycle:".cyan(),
        report.enqueued,
        report.skipped,
        report.completed.to_string().green(),
        report.requeued.to_string().yellow(),
        report.failed.to_string().red(),
        report.errored.to_string().red(),
        report.recovered
    );
}

async fn handle_sweep_command(config: &Config, storage: Arc<JsonlStorage>) -> Result<()> {
    info!("Running scan cycle");
    let queue = build_queue(config, storage)?;
    let report = run_scan_cycle(&queue).await.context("Scan cycle failed")?;
    print_report(&report);
    Ok(())
}

async fn handle_work_command(max_jobs: Option<usize>, config: &Config, storage: Arc<JsonlStorage>) -> Result<()> {
    info!("Working queue (max jobs: {:?})", max_jobs);
    let queue = build_queue(config, storage)?;
    let report = run_worker(&queue, max_jobs).await.context("Worker failed")?;
    print_report(&report);
    Ok(())
}

fn build_reviewer(config: &Config) -> Result<PrReviewer> {
    let c = collaborators(config)?;
    let classifier = AnalysisClassifier::new(c.analysis, c.limiter.clone(), config.review_config());
    Ok(PrReviewer::new(
        c.host,
        Arc::new(classifier),
        c.limiter,
        config.github.branch_prefix.clone(),
    ))
}

async fn handle_review_command(owner: &str, repo: &str, pr: Option<u64>, config: &Config) -> Result<()> {
    info!("Reviewing {}/{} (pr: {:?})", owner, repo, pr);
    let reviewer = build_reviewer(config)?;

    let results = match pr {
        Some(number) => vec![(number, reviewer.review_pr(owner, repo, number).await?)],
        None => {
            let sweep = reviewer.review_open_pull_requests(owner, repo).await?;
            for (number, error) in &sweep.failures {
                println!("{} #{}: {}", "Failed:".red(), number, error);
            }
            sweep.reviewed
        }
    };

    for (number, result) in results {
        let verdict = match (result.is_valid, result.can_merge) {
            (true, true) => "approved and merged".green(),
            (true, false) => "approved".green(),
            (false, _) => "changes requested".yellow(),
        };
        println!("#{} {}", number, verdict);
    }
    Ok(())
}

async fn handle_close_command(owner: &str, repo: &str, pr: u64, config: &Config) -> Result<()> {
    info!("Closing {}/{}#{}", owner, repo, pr);
    build_reviewer(config)?.close_pr(owner, repo, pr).await?;
    println!("#{} {}", pr, "closed".yellow());
    Ok(())
}

fn handle_jobs_command(status: Option<&str>, storage: &JsonlStorage) -> Result<()> {
    let jobs = JobStore::new(storage);
    let list = match status {
        Some(s) => jobs.find_by_status(s.parse::<JobStatus>()?)?,
        None => jobs.list_all()?,
    };
    for job in list {
        let status = match job.status {
            JobStatus::Completed => job.status.to_string().green(),
            JobStatus::Failed => job.status.to_string().red(),
            JobStatus::InProgress => job.status.to_string().cyan(),
            JobStatus::Pending => job.status.to_string().normal(),
        };
        println!(
            "{}  {:<12} repo={} attempts={}/{}",
            job.id.dimmed(),
            status,
            job.repository_id,
            job.attempts,
            job.max_attempts
        );
        if let Some(error) = &job.error {
            println!("    {}", error.red());
        }
        for url in job.pr_urls() {
            println!("    {}", url);
        }
    }
    Ok(())
}

fn handle_stats_command(storage: Arc<JsonlStorage>) -> Result<()> {
    let stats = Monitor::new(storage).stats()?;
    println!("{}", "Job statistics".cyan().bold());
    println!("  total:        {}", stats.total_jobs);
    println!("  pending:      {}", stats.pending);
    println!("  in progress:  {}", stats.in_progress);
    println!("  completed:    {}", stats.completed.to_string().green());
    println!("  failed:       {}", stats.failed.to_string().red());
    println!("  PRs created:  {}", stats.prs_created);
    println!("  success rate: {}%", stats.success_rate);
    Ok(())
}

fn handle_webhook_command(
    payload: &Path,
    signature: &str,
    event: Option<&str>,
    config: &Config,
    storage: &JsonlStorage,
) -> Result<()> {
    let body = fs::read(payload).context(format!("Failed to read payload {}", payload.display()))?;
    let handler = WebhookHandler::new(config.webhook_config()).with_max_attempts(config.jobs.max_attempts);
    match handler.handle(storage, event, &body, Some(signature))? {
        WebhookOutcome::Enqueued { job_id } => println!("{} {}", "Scan job queued:".green(), job_id),
        WebhookOutcome::AlreadyQueued => println!("{}", "Scan already queued".yellow()),
        WebhookOutcome::Ignored(reason) => println!("{} {}", "Event ignored:".dimmed(), reason),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
