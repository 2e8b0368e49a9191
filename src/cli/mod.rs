pub mod output;

use std::{
    fmt::Display,
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use futures::{stream, StreamExt, TryStreamExt};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        processing::{error::TrackerError, tracker::Tracker},
        start_daemon,
        storage::{
            config_storage::ConfigStorage,
            entities::{DayModifier, EventEntity, Presence},
            month_storage::{MonthStorage, MonthStorageImpl},
        },
        DEFAULT_PORT,
    },
    history::{event_log::EventLog, modifiers::ToggleOutcome},
    utils::{
        clock::DefaultClock,
        dir::resolve_application_path,
        logging::{enable_logging, CLI_PREFIX},
        time::YearMonth,
    },
};

#[derive(Parser, Debug)]
#[command(name = "clockin", version, long_about = None)]
#[command(about = "Keeps track of the time you spend at work", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Run the server directly in the current console")]
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    #[command(about = "Record arriving at work")]
    Enter {
        #[command(flatten)]
        at: AtArg,
    },
    #[command(about = "Record leaving work")]
    Exit {
        #[command(flatten)]
        at: AtArg,
    },
    #[command(about = "Mark a day as sick leave")]
    Sick {
        #[command(flatten)]
        command: ModifierCommand,
    },
    #[command(about = "Mark a day as vacation")]
    Vacation {
        #[command(flatten)]
        command: ModifierCommand,
    },
    #[command(about = "Show time worked today")]
    Status,
    #[command(about = "Print recorded days of a month")]
    History {
        #[arg(long, requires = "month")]
        year: Option<i32>,
        #[arg(long, requires = "year")]
        month: Option<u32>,
        #[arg(
            long,
            default_value_t = 1,
            conflicts_with = "year",
            help = "Number of months to print, ending with the current one"
        )]
        last: usize,
    },
    #[command(about = "Replace a month with events from a json file")]
    Import {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
struct AtArg {
    #[arg(
        long,
        help = "Time of the event instead of now. Examples are \"9:00\", \"yesterday 17:30\", \"15/03/2025 8:45\""
    )]
    at: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl AtArg {
    fn parse(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(at) = &self.at else {
            return Ok(None);
        };
        match parse_date_string(at, Local::now(), self.date_style.into()) {
            Ok(v) => Ok(Some(v.with_timezone(&Utc))),
            Err(e) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate time {at}: {e}"),
                )
                .into()),
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
struct ModifierCommand {
    #[command(flatten)]
    at: AtArg,
    #[arg(long, help = "Clear the mark instead of setting it")]
    off: bool,
    #[arg(long, help = "Replace another mark present on the same day")]
    replace: bool,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = resolve_application_path(args.dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Serve { port } => {
            start_daemon(&app_dir, SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
        }
        Commands::Enter { at } => submit(&app_dir, Presence::Enter, at.parse()?).await,
        Commands::Exit { at } => submit(&app_dir, Presence::Exit, at.parse()?).await,
        Commands::Sick { command } => toggle(&app_dir, DayModifier::Sick, command).await,
        Commands::Vacation { command } => toggle(&app_dir, DayModifier::Vacation, command).await,
        Commands::Status => status(&app_dir).await,
        Commands::History { year, month, last } => {
            let months = match (year, month) {
                (Some(year), Some(month)) => vec![parse_month(year, month)?],
                _ => YearMonth::of(Utc::now()).trailing(last.max(1)),
            };
            history(&app_dir, months).await
        }
        Commands::Import { year, month, file } => {
            import(&app_dir, parse_month(year, month)?, &file).await
        }
    }
}

fn parse_month(year: i32, month: u32) -> Result<YearMonth> {
    YearMonth::new(year, month).ok_or_else(|| {
        Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("{year}-{month} isn't a valid month"),
            )
            .into()
    })
}

fn month_storage(app_dir: &Path) -> Result<MonthStorageImpl> {
    Ok(MonthStorageImpl::new(app_dir.join("records"))?)
}

/// The cli works with the data directory directly. It shouldn't be used for changes while a
/// server is running on the same directory, the server keeps the current month in memory.
fn local_tracker(app_dir: &Path) -> Result<Tracker<MonthStorageImpl>> {
    Ok(Tracker::new(
        month_storage(app_dir)?,
        ConfigStorage::new(app_dir.to_path_buf()),
        Box::new(DefaultClock),
    ))
}

/// Prints expected failures as messages, everything else is an error of the command.
fn report<T>(result: Result<T, TrackerError>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e @ TrackerError::Storage(_)) => Err(e.into()),
        Err(e) => {
            output::print_rejection(&e);
            Ok(None)
        }
    }
}

async fn submit(app_dir: &Path, presence: Presence, time: Option<DateTime<Utc>>) -> Result<()> {
    let mut tracker = local_tracker(app_dir)?;
    if let Some(decision) = report(tracker.submit(presence, time).await)? {
        output::print_decision(presence, &decision);
    }
    Ok(())
}

async fn toggle(app_dir: &Path, modifier: DayModifier, command: ModifierCommand) -> Result<()> {
    let time = command.at.parse()?;
    let mut tracker = local_tracker(app_dir)?;
    let result = tracker
        .toggle_modifier(modifier, time, !command.off, command.replace)
        .await;
    if let Some(outcome) = report(result)? {
        let message = match outcome {
            ToggleOutcome::Added => format!("Marked as {modifier}"),
            ToggleOutcome::Replaced { previous } => format!("Replaced {previous} with {modifier}"),
            ToggleOutcome::Removed => format!("Removed {modifier} mark"),
            _ => "Nothing changed".to_string(),
        };
        println!("{message}");
    }
    Ok(())
}

async fn status(app_dir: &Path) -> Result<()> {
    let mut tracker = local_tracker(app_dir)?;
    let session = tracker.session().await?;
    output::print_session(&session);
    Ok(())
}

async fn history(app_dir: &Path, months: Vec<YearMonth>) -> Result<()> {
    let storage = Arc::new(month_storage(app_dir)?);
    let config = ConfigStorage::new(app_dir.to_path_buf()).load().await?;
    let now = Utc::now();

    // Months are independent files, so they can be read ahead while printing.
    let logs = stream::iter(months)
        .map(|month| {
            let storage = storage.clone();
            async move {
                storage
                    .load(month)
                    .await
                    .with_context(|| format!("Failed to read {month}"))
            }
        })
        .buffered(4);

    let config = &config;
    logs.try_for_each(|log: EventLog| async move {
        output::print_month(&log, &config, now);
        Ok(())
    })
    .await
}

async fn import(app_dir: &Path, month: YearMonth, file: &Path) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {file:?}"))?;
    let events: Vec<EventEntity> =
        serde_json::from_slice(&data).with_context(|| format!("{file:?} isn't a month export"))?;

    let mut tracker = local_tracker(app_dir)?;
    if let Some(outcome) = report(tracker.import(month, events).await)? {
        output::print_import(month, &outcome);
    }
    Ok(())
}
