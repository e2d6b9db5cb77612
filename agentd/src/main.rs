//! agentd - asynchronous LLM agent task runner
//!
//! CLI entry point for running completions and agent tasks.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser};
use eyre::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use agentd::cli::{Cli, Command, OutputFormat, TasksCommand, get_log_path};
use agentd::config::Config;
use agentd::domain::{Priority, Task, TaskStatus, is_valid_id};
use agentd::events::{EventBus, TaskEventType, spawn_event_logger};
use agentd::llm::{CompletionOrchestrator, ModelRouter};
use agentd::pipeline::{TaskProcessor, WorkerPool};
use agentd::queue::WorkQueue;
use agentd::service::{NewAgent, NewTask, TaskService, TaskStats};
use agentd::state::{StateManager, TaskFilter, recover, scan_for_recovery};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Write to the log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(models = config.models.len(), workers = config.queue.workers, "agentd loaded config");

    match cli.command {
        Some(Command::Models { format }) => cmd_models(&config, format),
        Some(Command::Complete {
            model,
            system,
            temperature,
            max_tokens,
            prompt,
        }) => cmd_complete(&config, &model, &system, temperature, max_tokens, &prompt).await,
        Some(Command::Run {
            agent,
            prompts,
            user,
            priority,
            max_retries,
            memory,
        }) => cmd_run(&config, &agent, prompts, &user, priority, max_retries, memory).await,
        Some(Command::Tasks { command }) => match command {
            TasksCommand::List {
                user,
                status,
                agent,
                format,
            } => cmd_tasks_list(&config, &user, status, agent, format).await,
            TasksCommand::Show { id, user, format } => cmd_tasks_show(&config, &id, &user, format).await,
        },
        Some(Command::Stats { user, format }) => cmd_stats(&config, &user, format).await,
        Some(Command::Logs { lines }) => cmd_logs(lines),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn build_router(config: &Config) -> Result<Arc<ModelRouter>> {
    let router = ModelRouter::from_config(config).context("Failed to build model router")?;
    Ok(Arc::new(router))
}

/// Print the model table
fn cmd_models(config: &Config, format: OutputFormat) -> Result<()> {
    let router = build_router(config)?;
    let rows: Vec<(String, String)> = router
        .list_models()
        .into_iter()
        .map(|model| {
            let provider = router.provider_name_for(&model).unwrap_or("-").to_string();
            (model, provider)
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = rows
                .iter()
                .map(|(model, provider)| serde_json::json!({ "model": model, "provider": provider }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{:<20} PROVIDER", "MODEL");
            for (model, provider) in rows {
                println!("{:<20} {}", model, provider);
            }
        }
    }
    Ok(())
}

/// Run one completion through the orchestrator
async fn cmd_complete(
    config: &Config,
    model: &str,
    system: &str,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    prompt: &str,
) -> Result<()> {
    let orchestrator = CompletionOrchestrator::new(build_router(config)?);
    let result = orchestrator
        .complete(model, system, prompt, temperature, max_tokens)
        .await
        .context(format!("Completion with {} failed", model))?;

    println!("{}", result.response.content);
    eprintln!(
        "[{} {} in {}ms, tokens: {}]",
        result.provider,
        result.response.model,
        result.duration.as_millis(),
        result
            .response
            .tokens_used
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    Ok(())
}

fn open_state(config: &Config) -> Result<StateManager> {
    StateManager::spawn(&config.storage.path)
        .context(format!("Failed to open database at {}", config.storage.path.display()))
}

/// Create an agent, submit prompts and run the pool until everything settles
async fn cmd_run(
    config: &Config,
    agent_file: &Path,
    prompts: Vec<String>,
    user: &str,
    priority: Option<Priority>,
    max_retries: Option<u32>,
    memory: bool,
) -> Result<()> {
    let content = fs::read_to_string(agent_file).context(format!("Failed to read {}", agent_file.display()))?;
    let new_agent: NewAgent = serde_yaml::from_str(&content).context("Failed to parse agent definition")?;

    let router = build_router(config)?;
    let state = if memory { StateManager::in_memory() } else { open_state(config)? };
    let queue = Arc::new(WorkQueue::new());
    let events = Arc::new(EventBus::new(config.events.channel_capacity));

    let logger = config
        .events
        .log_dir
        .as_ref()
        .map(|log_dir| spawn_event_logger(&events, log_dir));

    let stats = recover(&state, &queue, &config.queue).await?;
    if stats.requeued > 0 || stats.rescheduled > 0 {
        eprintln!("Recovered outstanding work ({})", stats);
    }

    // Stream this user's events as JSON lines
    let mut rx = events.register(user);
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.event == TaskEventType::Event => {}
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Failed to serialize event"),
                },
                Err(RecvError::Lagged(n)) => warn!(missed = n, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let service = TaskService::new(
        state.clone(),
        queue.clone(),
        events.clone(),
        router.clone(),
        config.queue.clone(),
    );
    let agent = service
        .create_agent(user, new_agent)
        .await
        .context("Failed to create agent")?;

    let mut task_ids = Vec::new();
    for prompt in prompts {
        let request = NewTask {
            agent_id: agent.id.clone(),
            prompt,
            priority,
            max_retries,
            metadata: None,
        };
        let task = service.create_task(user, request).await.context("Failed to submit task")?;
        task_ids.push(task.id);
    }

    let processor = Arc::new(TaskProcessor::new(
        state.clone(),
        CompletionOrchestrator::new(router),
        events.clone(),
    ));
    let pool = WorkerPool::spawn(config.queue.workers, queue.clone(), processor);

    tokio::select! {
        _ = queue.wait_idle() => {
            info!("All tasks settled");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, shutting down");
        }
    }

    let aborted = pool.shutdown(config.queue.shutdown_timeout()).await;
    if aborted > 0 {
        warn!(aborted, "Workers aborted during shutdown");
    }

    events.unregister(user);
    let _ = printer.await;

    let mut tasks = Vec::new();
    for id in &task_ids {
        if let Some(task) = state.get_task(id).await? {
            tasks.push(task);
        }
    }
    let summary = TaskStats::from_tasks(&tasks);
    eprintln!(
        "{} tasks: {} completed, {} failed, {} pending ({}% success)",
        summary.total, summary.completed, summary.failed, summary.pending, summary.success_rate
    );

    state.shutdown().await?;
    drop(service);
    drop(events);
    if let Some(logger) = logger
        && tokio::time::timeout(Duration::from_secs(5), logger).await.is_err()
    {
        warn!("Event logger did not stop in time");
    }
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        format!("{}...", line.chars().take(max).collect::<String>())
    } else {
        line.to_string()
    }
}

fn print_task(task: &Task) {
    println!("ID:         {}", task.id);
    println!("Agent:      {}", task.agent_id);
    println!("Status:     {}", task.status);
    println!("Priority:   {}", task.priority);
    println!("Retries:    {}/{}", task.retry_count, task.max_retries);
    println!("Created:    {}", task.created_at);
    if let Some(started) = task.started_at {
        println!("Started:    {}", started);
    }
    if let Some(completed) = task.completed_at {
        println!("Completed:  {}", completed);
    }
    if let Some(ms) = task.execution_time_ms {
        println!("Duration:   {}ms", ms);
    }
    if let Some(tokens) = task.tokens_used {
        println!("Tokens:     {}", tokens);
    }
    println!();
    println!("Prompt:\n{}", task.prompt);
    if let Some(response) = &task.response {
        println!();
        println!("Response:\n{}", response);
    }
    if let Some(error) = &task.error {
        println!();
        println!("Error: {}", error);
    }
}

/// List stored tasks
async fn cmd_tasks_list(
    config: &Config,
    user: &str,
    status: Option<TaskStatus>,
    agent: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let state = open_state(config)?;
    let filter = TaskFilter {
        user_id: Some(user.to_string()),
        status,
        agent_id: agent,
    };
    let tasks = state.list_tasks(filter).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tasks)?),
        OutputFormat::Text => {
            if tasks.is_empty() {
                println!("No tasks found");
            }
            for task in &tasks {
                println!(
                    "{}  {:<10} {:<7} {}  {}",
                    task.id,
                    task.status,
                    task.priority,
                    task.created_at.format("%Y-%m-%d %H:%M:%S"),
                    truncate(&task.prompt, 50)
                );
            }
        }
    }

    state.shutdown().await?;
    Ok(())
}

/// Show one stored task
async fn cmd_tasks_show(config: &Config, id: &str, user: &str, format: OutputFormat) -> Result<()> {
    if !is_valid_id(id) {
        return Err(eyre::eyre!("Invalid task ID: {}", id));
    }

    let state = open_state(config)?;
    let task = state
        .get_task(id)
        .await?
        .filter(|t| t.user_id == user)
        .ok_or_else(|| eyre::eyre!("Task not found: {}", id))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&task)?),
        OutputFormat::Text => print_task(&task),
    }

    state.shutdown().await?;
    Ok(())
}

/// Show task counts for a user
async fn cmd_stats(config: &Config, user: &str, format: OutputFormat) -> Result<()> {
    let state = open_state(config)?;
    let tasks = state.list_tasks(TaskFilter::for_user(user)).await?;
    let stats = TaskStats::from_tasks(&tasks);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Tasks for {}", user);
            println!("-----------------");
            println!("Total:      {}", stats.total);
            println!("Pending:    {}", stats.pending);
            println!("Processing: {}", stats.processing);
            println!("Completed:  {}", stats.completed);
            println!("Failed:     {}", stats.failed);
            println!("Cancelled:  {}", stats.cancelled);
            println!("Success:    {}%", stats.success_rate);

            let pending = scan_for_recovery(&state).await?;
            if pending.requeued > 0 || pending.rescheduled > 0 {
                println!();
                println!("Next run will resume unfinished tasks ({})", pending);
            }
        }
    }

    state.shutdown().await?;
    Ok(())
}

/// Show the tail of the log file
fn cmd_logs(lines: usize) -> Result<()> {
    let log_path: PathBuf = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader.lines().map_while(std::result::Result::ok).collect();

    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
