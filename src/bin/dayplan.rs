//! CLI binary for dayplan.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dayplan::assistant::{OneShotSession, WsConnector};
use dayplan::focus::{FocusTimer, Tick};
use dayplan::planner::import::{import_reminders, parse_reminders};
use dayplan::planner::model::{DayPart, sorted_by_start, todo_sections};
use dayplan::planner::{DayStats, EntityPool, Priority, Resolution, resolve};
use dayplan::{PlannerConfig, PlannerStore, Schedule};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Dayplan: a day planner driven by a voice/text assistant.
#[derive(Parser)]
#[command(name = "dayplan", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the JSON schedule file.
    #[arg(short, long)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the day: timeline by part of day, then anytime todos.
    Show,

    /// Print completed todos and hours planned today.
    Stats,

    /// Ask the assistant to change the schedule.
    Ask {
        /// What to do, in plain words.
        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Talk to the assistant (needs the `audio-device` feature).
    Voice,

    /// Import reminders from a JSON export.
    Import { file: PathBuf },

    /// Manage anytime todos.
    #[command(subcommand)]
    Todo(TodoCommand),

    /// Mark a scheduled task as finished; it leaves the timeline.
    Done { title: String },

    /// Toggle one subtask of a scheduled task.
    Check { task: String, subtask: String },

    /// Run a focus countdown for a task.
    Focus { title: String },

    /// Print the effective configuration.
    Config {
        /// Write the defaults to the config path.
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum TodoCommand {
    Add {
        #[arg(required = true)]
        title: Vec<String>,
        /// high, medium, low, or none.
        #[arg(short, long, default_value = "none", value_parser = parse_priority)]
        priority: Priority,
    },
    Toggle { title: String },
    Remove { title: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dayplan=info,tungstenite=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = PlannerConfig::load(cli.config.as_deref())?;
    let state_path = cli.state.unwrap_or_else(default_state_path);

    match cli.command.unwrap_or(Command::Show) {
        Command::Config { init } => run_config(&config, cli.config.as_deref(), init),
        Command::Show => {
            let schedule = load_schedule(&state_path)?;
            print_schedule(&schedule);
            Ok(())
        }
        Command::Stats => {
            print_stats(&load_schedule(&state_path)?.stats());
            Ok(())
        }
        command => {
            let store = PlannerStore::new(load_schedule(&state_path)?);
            run_mutation(command, &config, &store).await?;
            save_schedule(&state_path, &store.snapshot().await)
        }
    }
}

async fn run_mutation(
    command: Command,
    config: &PlannerConfig,
    store: &PlannerStore,
) -> anyhow::Result<()> {
    match command {
        Command::Ask { prompt } => run_ask(&prompt.join(" "), config, store).await,
        Command::Voice => run_voice(config, store).await,
        Command::Import { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let actions = import_reminders(&parse_reminders(&json)?);
            let summary = store.apply(&actions).await;
            println!("Imported {} reminders.", summary.applied);
            Ok(())
        }
        Command::Todo(TodoCommand::Add { title, priority }) => {
            match store.add_todo(&title.join(" "), priority).await {
                Some(_) => println!("Added."),
                None => println!("Nothing to add."),
            }
            Ok(())
        }
        Command::Todo(TodoCommand::Toggle { title }) => {
            let id = find(store, &title).await?;
            match store.toggle_todo(&id).await {
                Some(true) => println!("Done."),
                Some(false) => println!("Reopened."),
                None => println!("\"{title}\" is not a todo."),
            }
            Ok(())
        }
        Command::Todo(TodoCommand::Remove { title }) => {
            let id = find(store, &title).await?;
            if !store.delete_todo(&id).await {
                println!("\"{title}\" is not a todo.");
            }
            Ok(())
        }
        Command::Done { title } => {
            let id = find(store, &title).await?;
            match store.complete_task(&id).await {
                Some(task) => println!("Finished {} {}.", task.icon, task.title),
                None => println!("\"{title}\" is not on the timeline."),
            }
            Ok(())
        }
        Command::Check { task, subtask } => {
            let schedule = store.snapshot().await;
            let id = find(store, &task).await?;
            let sub = schedule
                .tasks
                .iter()
                .find(|t| t.id == id)
                .and_then(|t| {
                    let needle = subtask.to_lowercase();
                    t.subtasks.iter().find(|s| s.title.to_lowercase().contains(&needle))
                })
                .with_context(|| format!("no subtask matching \"{subtask}\""))?;
            if let Some(done) = store.toggle_subtask(&id, &sub.id).await {
                println!("{} {}", if done { "[x]" } else { "[ ]" }, sub.title);
            }
            Ok(())
        }
        Command::Focus { title } => run_focus(store, &title).await,
        Command::Show | Command::Stats | Command::Config { .. } => Ok(()),
    }
}

fn parse_priority(name: &str) -> Result<Priority, String> {
    Priority::parse(name).ok_or_else(|| format!("unknown priority \"{name}\""))
}

async fn find(store: &PlannerStore, fragment: &str) -> anyhow::Result<dayplan::planner::EntityId> {
    let schedule = store.snapshot().await;
    match resolve(fragment, EntityPool::new(&schedule.tasks, &schedule.todos)) {
        Resolution::Found(id) => Ok(id),
        Resolution::NotFound => anyhow::bail!("nothing matches \"{fragment}\""),
    }
}

async fn run_ask(prompt: &str, config: &PlannerConfig, store: &PlannerStore) -> anyhow::Result<()> {
    let connector = Arc::new(WsConnector::new(config.assistant.connection_url()?));
    let session = OneShotSession::new(connector, config.assistant.clone());
    let snapshot = store.snapshot().await;
    let now = chrono::Local::now().format("%A, %B %-d %Y, %H:%M").to_string();

    let actions = session
        .generate_schedule(prompt, &now, &snapshot.tasks, &snapshot.todos)
        .await?;
    if actions.is_empty() {
        println!("The assistant made no changes.");
        return Ok(());
    }
    for action in &actions {
        info!(kind = action.kind(), "assistant action");
    }
    let summary = store.apply(&actions).await;
    println!("Applied {} change(s).", summary.applied);
    print_schedule(&store.snapshot().await);
    Ok(())
}

#[cfg(feature = "audio-device")]
async fn run_voice(config: &PlannerConfig, store: &PlannerStore) -> anyhow::Result<()> {
    use dayplan::assistant::VoiceSession;
    use dayplan::audio::AudioSource;
    use dayplan::audio::capture::CpalCapture;
    use dayplan::audio::playback::{CpalPlayback, PlaybackHandle};

    let playback = PlaybackHandle::new(config.audio.output_sample_rate);
    let speaker = CpalPlayback::start(&config.audio, playback.clone())?;
    let mic = CpalCapture::new(&config.audio)?;
    let (tx, rx) = tokio::sync::mpsc::channel(64);

    let connector = Arc::new(WsConnector::new(config.assistant.connection_url()?));
    let handle = VoiceSession::open(connector, config, store.clone(), playback, rx).await?;
    let capture = mic.start(tx, handle.cancellation())?;
    println!("Say \"Add a coffee break at 4pm\". Press Ctrl+C to stop.");

    let mut states = handle.subscribe();
    let follow_states = async {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("received Ctrl+C, closing voice session");
                    handle.close();
                    break;
                }
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *states.borrow_and_update();
                    eprintln!("[{state}]");
                    if !state.is_live() {
                        break;
                    }
                }
            }
        }
    };
    tokio::join!(capture.run_until(handle.cancellation()), follow_states);

    let final_state = handle.finished().await;
    speaker.stop();
    if final_state == dayplan::SessionState::Error {
        anyhow::bail!("voice session failed");
    }
    print_schedule(&store.snapshot().await);
    Ok(())
}

#[cfg(not(feature = "audio-device"))]
async fn run_voice(_config: &PlannerConfig, _store: &PlannerStore) -> anyhow::Result<()> {
    anyhow::bail!("voice needs a build with `--features audio-device`")
}

async fn run_focus(store: &PlannerStore, fragment: &str) -> anyhow::Result<()> {
    let id = find(store, fragment).await?;
    let schedule = store.snapshot().await;
    let task = schedule
        .tasks
        .iter()
        .find(|t| t.id == id)
        .with_context(|| format!("\"{fragment}\" is not on the timeline"))?;

    let now = || chrono::Local::now().time();
    let mut timer = FocusTimer::for_task(task, now());
    println!("{} {}  {}", task.icon, timer.title(), timer.time_range(now()));
    for item in timer.checklist() {
        println!("  {} {}", if item.done { "[x]" } else { "[ ]" }, item.title);
    }
    timer.toggle();

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopped with {} left.", timer.format_remaining());
                return Ok(());
            }
            _ = ticker.tick() => match timer.tick(1) {
                Tick::Finished => break,
                Tick::Running if timer.remaining_secs() % 60 == 0 => {
                    println!("{} left", timer.format_remaining());
                }
                Tick::Running | Tick::Paused => {}
            },
        }
    }

    println!("Time's up!");
    if store.complete_task(&id).await.is_some() {
        println!("Finished {}.", task.title);
    }
    Ok(())
}

fn run_config(config: &PlannerConfig, path: Option<&Path>, init: bool) -> anyhow::Result<()> {
    if init {
        let path = path.map(Path::to_path_buf).unwrap_or_else(PlannerConfig::default_config_path);
        PlannerConfig::default().save_to_file(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }
    let mut shown = config.clone();
    if !shown.assistant.api_key.is_empty() {
        shown.assistant.api_key = "<redacted>".into();
    }
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("dayplan"))
        .unwrap_or_else(|| PathBuf::from("/tmp/dayplan"))
        .join("schedule.json")
}

fn load_schedule(path: &Path) -> anyhow::Result<Schedule> {
    if !path.exists() {
        return Ok(Schedule::default());
    }
    let json =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

fn save_schedule(path: &Path, schedule: &Schedule) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(schedule)?)
        .with_context(|| format!("writing {}", path.display()))
}

fn print_schedule(schedule: &Schedule) {
    if schedule.is_empty() {
        println!("Nothing planned.");
        return;
    }
    let tasks = sorted_by_start(&schedule.tasks);
    for part in [DayPart::Morning, DayPart::Day, DayPart::Evening] {
        let in_part: Vec<_> = tasks.iter().filter(|t| t.day_part() == Some(part)).collect();
        if in_part.is_empty() {
            continue;
        }
        println!("{part}");
        for task in in_part {
            let start = task.start_time.as_deref().unwrap_or("--:--");
            let end = task.end_time().unwrap_or_else(|| "--:--".into());
            println!("  {start}-{end}  {} {}", task.icon, task.title);
            for sub in &task.subtasks {
                println!("      {} {}", if sub.done { "[x]" } else { "[ ]" }, sub.title);
            }
        }
    }
    if !schedule.todos.is_empty() {
        println!("Anytime");
        let (sections, completed) = todo_sections(&schedule.todos);
        for section in sections.iter().filter(|s| !s.items.is_empty()) {
            println!("  {} ({})", section.priority.heading(), section.items.len());
            for todo in &section.items {
                println!("    [ ] {} {}", todo.icon, todo.title);
            }
        }
        if !completed.is_empty() {
            println!("  COMPLETED ({})", completed.len());
            for todo in completed {
                println!("    [x] {} {}", todo.icon, todo.title);
            }
        }
    }
}

fn print_stats(stats: &DayStats) {
    println!("Todos completed: {}", stats.completed_todos);
    println!("Todos open:      {}", stats.open_todos);
    println!("Tasks finished:  {}", stats.completed_tasks);
    println!("Hours planned:   {}", stats.planned_hours());
}
