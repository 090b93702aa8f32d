//! Command-line interface
//!
//! Each invocation restores the timer from disk, applies one command and
//! saves it again, so running `tabbie` is the equivalent of reloading the
//! dashboard. `watch` is the only long-lived command.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use chrono::{Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::{Config, DataDir};
use crate::pomodoro::stats::{
    aggregate_by_day, aggregate_by_task, calculate_overall_stats, format_duration, records_since,
};
use crate::pomodoro::{
    FileSnapshotStore, SessionHistory, SessionType, SystemClock, Task, TaskId, TimerEvent,
    TimerManager, TimerPhase, TimerStatus, UserData, UserDataStore,
};

/// Tabbie - pomodoro timer that survives restarts
#[derive(Parser, Debug)]
#[command(name = "tabbie")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Data directory (default: $TABBIE_DIR or ~/.tabbie)
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Echo log output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a session
    Start {
        /// Task id, id prefix or title
        #[arg(short, long)]
        task: Option<String>,

        /// Length in minutes (default: from settings)
        #[arg(short, long)]
        minutes: Option<f64>,

        /// Kind of session
        #[arg(short, long, value_enum, default_value_t = SessionKind::Work)]
        kind: SessionKind,
    },

    /// Pause the running session
    Pause,

    /// Resume a paused session
    Resume,

    /// Abandon the current session (logged, no task credit)
    Stop,

    /// Finish the current session
    Complete,

    /// End the current break and get back to work
    SkipBreak,

    /// Move on to the next session
    Next,

    /// Show the timer
    Status {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Live countdown until Ctrl-C
    Watch,

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Focus statistics
    Stats {
        /// Days to look back
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },

    /// Show or change pomodoro settings
    Settings(SettingsArgs),
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Add a task
    Add {
        title: String,

        /// Estimated work sessions
        #[arg(short, long)]
        estimate: Option<u32>,
    },

    /// List tasks
    #[command(alias = "ls")]
    List {
        /// Include completed tasks
        #[arg(short, long)]
        all: bool,
    },

    /// Mark a task as completed
    Done {
        /// Task id, id prefix or title
        task: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Work session length in minutes
    #[arg(long)]
    pub work: Option<f64>,

    /// Short break length in minutes
    #[arg(long)]
    pub short_break: Option<f64>,

    /// Long break length in minutes
    #[arg(long)]
    pub long_break: Option<f64>,

    /// Work sessions between long breaks
    #[arg(long)]
    pub long_break_every: Option<u32>,

    /// Start breaks automatically
    #[arg(long)]
    pub auto_breaks: Option<bool>,

    /// Start work sessions automatically after a break
    #[arg(long)]
    pub auto_pomodoros: Option<bool>,
}

impl SettingsArgs {
    fn is_empty(&self) -> bool {
        self.work.is_none()
            && self.short_break.is_none()
            && self.long_break.is_none()
            && self.long_break_every.is_none()
            && self.auto_breaks.is_none()
            && self.auto_pomodoros.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SessionKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl From<SessionKind> for SessionType {
    fn from(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Work => SessionType::Work,
            SessionKind::ShortBreak => SessionType::ShortBreak,
            SessionKind::LongBreak => SessionType::LongBreak,
        }
    }
}

/// Resolved locations and configuration for one invocation
#[derive(Debug, Clone)]
pub struct Context {
    pub data_dir: DataDir,
    pub config: Config,
}

type FileTimer = TimerManager<SystemClock, FileSnapshotStore, UserDataStore>;

fn load_user_data(ctx: &Context) -> UserDataStore {
    UserDataStore::load_or_default(&ctx.data_dir.user_data_file())
}

/// Restore the timer, collecting any notice about what happened to the saved state
fn open_timer(ctx: &Context, out: &mut Vec<String>) -> FileTimer {
    let store = FileSnapshotStore::new(ctx.data_dir.timer_state_file());
    tracing::debug!("Restoring timer from {}", store.path().display());
    let timer = TimerManager::restore(SystemClock, store, load_user_data(ctx), ctx.config.overtime);
    if let Some(notice) = timer.restore_outcome().notice() {
        out.push(notice.to_string());
    }
    timer
}

fn resolve_task(data: &UserData, reference: &str) -> Result<TaskId> {
    match data.find_task(reference) {
        Some(task) if task.completed => bail!("Task '{}' is already completed", task.title),
        Some(task) => Ok(task.id),
        None => bail!("No task matches '{}'", reference),
    }
}

fn task_title(data: &UserData, id: Option<TaskId>) -> Option<&str> {
    id.and_then(|id| data.task(id)).map(|t| t.title.as_str())
}

/// One-line human rendering of the timer
pub fn status_line(status: &TimerStatus, task_title: Option<&str>) -> String {
    let mut line = match status.phase {
        TimerPhase::Idle => "Idle".to_string(),
        TimerPhase::AwaitingNext => format!(
            "{} {} finished. Run `tabbie next` to continue",
            status.session_type.icon(),
            status.session_type.label()
        ),
        phase => format!(
            "{} {} {} ({})",
            status.session_type.icon(),
            status.session_type.label(),
            status.display.as_deref().unwrap_or("--:--"),
            phase.label()
        ),
    };
    if let Some(title) = task_title {
        line.push_str(&format!(" · {}", title));
    }
    line
}

fn describe_event(event: &TimerEvent) -> String {
    match event {
        TimerEvent::Finished { session_type } if session_type.is_break() => format!(
            "{} {} is over. `tabbie skip-break` to get back to work.",
            session_type.icon(),
            session_type.label()
        ),
        TimerEvent::Finished { session_type } => format!(
            "{} {} session is over. `tabbie complete` to take a break, or keep going.",
            session_type.icon(),
            session_type.label()
        ),
        TimerEvent::AutoAdvanced { next } => {
            format!("{} Starting {}", next.icon(), next.label().to_lowercase())
        }
        TimerEvent::OvertimeReminder {
            session_type,
            overtime_seconds,
        } => format!(
            "{} {} is {} over",
            session_type.icon(),
            session_type.label(),
            format_duration(Duration::from_secs(*overtime_seconds as u64))
        ),
        TimerEvent::AutoPaused {
            session_type,
            overtime_seconds,
        } => format!(
            "{} {} paused automatically after {} of overtime. `tabbie resume` to continue.",
            session_type.icon(),
            session_type.label(),
            format_duration(Duration::from_secs(*overtime_seconds as u64))
        ),
    }
}

/// Apply a timer transition and report the result
fn transition(
    ctx: &Context,
    verb: &str,
    apply: impl FnOnce(&mut FileTimer) -> bool,
) -> Result<String> {
    let mut out = Vec::new();
    let mut timer = open_timer(ctx, &mut out);
    let phase = timer.phase();
    if apply(&mut timer) {
        let status = timer.status();
        let title = task_title(timer.history().data(), status.task_id);
        out.push(status_line(&status, title));
    } else {
        out.push(format!("Nothing to {}: timer is {}", verb, phase.label()));
    }
    Ok(out.join("\n"))
}

fn start(
    ctx: &Context,
    task: Option<&str>,
    minutes: Option<f64>,
    kind: SessionKind,
) -> Result<String> {
    let mut out = Vec::new();
    let mut timer = open_timer(ctx, &mut out);
    let task_id = task
        .map(|reference| resolve_task(timer.history().data(), reference))
        .transpose()?;
    let session_type = SessionType::from(kind);
    let minutes = minutes.unwrap_or_else(|| timer.history().settings().duration_for(session_type));

    if timer.snapshot().current_session.is_some() {
        out.push(format!(
            "A session is already {}; stop or complete it first",
            timer.phase().label()
        ));
    } else if !timer.start(task_id, session_type, minutes) {
        bail!("Invalid session length: {} minutes", minutes);
    } else {
        let status = timer.status();
        out.push(status_line(&status, task_title(timer.history().data(), task_id)));
    }
    Ok(out.join("\n"))
}

fn status(ctx: &Context, json: bool) -> Result<String> {
    let mut out = Vec::new();
    let timer = open_timer(ctx, &mut out);
    let status = timer.status();
    if json {
        return serde_json::to_string_pretty(&status).context("Failed to serialize status");
    }
    out.push(status_line(&status, task_title(timer.history().data(), status.task_id)));
    if let Some(marker) = status.overtime_auto_paused {
        out.push(format!(
            "Auto-paused at {} after {} of overtime",
            marker.triggered_at.with_timezone(&Local).format("%H:%M"),
            format_duration(Duration::from_secs(marker.overtime_seconds.max(0) as u64))
        ));
    }
    Ok(out.join("\n"))
}

fn task_command(ctx: &Context, command: &TaskCommands) -> Result<String> {
    let mut store = load_user_data(ctx);
    match command {
        TaskCommands::Add { title, estimate } => {
            let title = title.trim();
            if title.is_empty() {
                bail!("Task title cannot be empty");
            }
            let task = Task::new(title, *estimate);
            let estimate = task.estimate();
            let id = store.data_mut().add_task(task);
            store
                .save()
                .map_err(|e| anyhow::anyhow!(e.describe("Failed to save tasks")))?;
            Ok(format!(
                "Added {} ({} pomodoros) [{}]",
                title,
                estimate,
                short_id(id)
            ))
        }
        TaskCommands::List { all } => {
            let data = store.data();
            let tasks: Vec<&Task> = if *all {
                data.tasks.iter().collect()
            } else {
                data.open_tasks().collect()
            };
            let lines: Vec<String> = tasks
                .into_iter()
                .map(|t| {
                    format!(
                        "{} [{}] {} {}/{}",
                        if t.completed { "✓" } else { " " },
                        short_id(t.id),
                        t.title,
                        t.completed_work_sessions(),
                        t.estimate()
                    )
                })
                .collect();
            if lines.is_empty() {
                Ok("No tasks".to_string())
            } else {
                Ok(lines.join("\n"))
            }
        }
        TaskCommands::Done { task } => {
            let id = resolve_task(store.data(), task)?;
            store.data_mut().complete_task(id);
            store
                .save()
                .map_err(|e| anyhow::anyhow!(e.describe("Failed to save tasks")))?;
            let title = task_title(store.data(), Some(id)).unwrap_or_default();
            Ok(format!("Completed {}", title))
        }
    }
}

fn short_id(id: TaskId) -> String {
    id.to_string().chars().take(8).collect()
}

fn stats(ctx: &Context, days: u32) -> Result<String> {
    let store = load_user_data(ctx);
    let data = store.data();
    let since = Utc::now() - chrono::Duration::days(i64::from(days));
    let records = records_since(&data.pomodoro_sessions, since);

    let overall = calculate_overall_stats(&records);
    let mut out = vec![format!(
        "Last {} days: {} pomodoros, {} focused, {} completed",
        days,
        overall.session_count,
        overall.format_total_focus(),
        overall.format_completion_rate()
    )];

    let by_day = aggregate_by_day(&records, &Local);
    if !by_day.is_empty() {
        out.push(String::new());
        for (day, day_stats) in &by_day {
            out.push(format!(
                "{}  {:>3} {}",
                day.format("%a %d %b"),
                day_stats.session_count,
                "🍅".repeat(day_stats.session_count.min(12) as usize)
            ));
        }
    }

    let mut by_task: Vec<_> = aggregate_by_task(&records).into_iter().collect();
    by_task.sort_by(|a, b| b.1.total_focus.cmp(&a.1.total_focus));
    if !by_task.is_empty() {
        out.push(String::new());
        for (task_id, task_stats) in by_task {
            out.push(format!(
                "{:<30} {:>3} pomodoros  {}",
                task_title(data, Some(task_id)).unwrap_or("(deleted task)"),
                task_stats.session_count,
                task_stats.format_total_focus()
            ));
        }
    }

    Ok(out.join("\n"))
}

fn settings(ctx: &Context, args: &SettingsArgs) -> Result<String> {
    let mut store = load_user_data(ctx);
    if !args.is_empty() {
        for minutes in [args.work, args.short_break, args.long_break].into_iter().flatten() {
            if !(minutes.is_finite() && minutes > 0.0) {
                bail!("Durations must be positive, got {}", minutes);
            }
        }
        let settings = &mut store.data_mut().settings;
        if let Some(v) = args.work {
            settings.work_duration = v;
        }
        if let Some(v) = args.short_break {
            settings.short_break_duration = v;
        }
        if let Some(v) = args.long_break {
            settings.long_break_duration = v;
        }
        if let Some(v) = args.long_break_every {
            settings.sessions_until_long_break = v;
        }
        if let Some(v) = args.auto_breaks {
            settings.auto_start_breaks = v;
        }
        if let Some(v) = args.auto_pomodoros {
            settings.auto_start_pomodoros = v;
        }
        store
            .save()
            .map_err(|e| anyhow::anyhow!(e.describe("Failed to save settings")))?;
    }

    let s = &store.data().settings;
    Ok(format!(
        "work: {} min\nshort break: {} min\nlong break: {} min (every {} pomodoros)\nauto-start breaks: {}\nauto-start pomodoros: {}",
        s.work_duration,
        s.short_break_duration,
        s.long_break_duration,
        s.sessions_until_long_break,
        s.auto_start_breaks,
        s.auto_start_pomodoros
    ))
}

/// Run every command except `watch`, returning what to print
pub fn execute(command: &Commands, ctx: &Context) -> Result<String> {
    match command {
        Commands::Start {
            task,
            minutes,
            kind,
        } => start(ctx, task.as_deref(), *minutes, *kind),
        Commands::Pause => transition(ctx, "pause", |t| t.pause()),
        Commands::Resume => transition(ctx, "resume", |t| t.resume()),
        Commands::Stop => transition(ctx, "stop", |t| t.stop()),
        Commands::Complete => transition(ctx, "complete", |t| {
            if t.is_work_overdue() {
                t.complete_work_session()
            } else {
                t.complete()
            }
        }),
        Commands::SkipBreak => transition(ctx, "skip", |t| t.skip_break()),
        Commands::Next => transition(ctx, "continue", |t| t.start_next_session()),
        Commands::Status { json } => status(ctx, *json),
        Commands::Task(command) => task_command(ctx, command),
        Commands::Stats { days } => stats(ctx, *days),
        Commands::Settings(args) => settings(ctx, args),
        Commands::Watch => bail!("watch must be run through `run`"),
    }
}

/// Redraw once a second until Ctrl-C, re-reading disk so other invocations show up
async fn watch(ctx: &Context) -> Result<()> {
    let mut out = Vec::new();
    let mut timer = open_timer(ctx, &mut out);
    for line in out {
        println!("{}", line);
    }

    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                *timer.history_mut() = load_user_data(ctx);
                if let Some(notice) = timer.reload().notice() {
                    println!("\n{}", notice);
                }
                let report = timer.tick();
                for event in &report.events {
                    println!("\n{}", describe_event(event));
                }
                let status = timer.status();
                let line = status_line(&status, task_title(timer.history().data(), status.task_id));
                print!("\r\x1b[2K{}", line);
                let _ = std::io::stdout().flush();
            }
            _ = &mut shutdown => {
                println!();
                break;
            }
        }
    }
    Ok(())
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli, ctx: Context) -> Result<()> {
    match &cli.command {
        Commands::Watch => watch(&ctx).await,
        command => {
            let output = execute(command, &ctx)?;
            println!("{}", output);
            Ok(())
        }
    }
}
