use std::{
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use chrono::Duration;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    select,
};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    export::{
        sink::{default_export_dir, CsvDirectorySink, ExportSink},
        ExportRange,
    },
    session::{
        registry::ProjectRegistry, shutdown::detect_shutdown, SessionError, Status, Toggle,
        TrackingSession,
    },
    storage::record_storage::{RecordStorage, RecordStorageImpl},
    utils::{clock::DefaultClock, color::paint, dir::AppPaths},
};

const HELP: &str = "\
<number>     toggle the project at that position
<name>       toggle the project with that name
status       show the running project
projects     list projects
export [dir] write csv tables of everything tracked so far
exit         save the running period and quit";

/// One line of input in the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// 0-based registry index.
    Select(usize),
    SelectName(String),
    Status,
    Projects,
    Export(Option<PathBuf>),
    Help,
    Exit,
    Empty,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("project numbers start at 1")]
pub struct ZeroProjectNumber;

impl FromStr for SessionCommand {
    type Err = ZeroProjectNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(number) = s.parse::<usize>() {
            return number
                .checked_sub(1)
                .map(SessionCommand::Select)
                .ok_or(ZeroProjectNumber);
        }

        let (word, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        let rest = rest.trim();
        Ok(match word.to_lowercase().as_str() {
            "" => SessionCommand::Empty,
            "status" if rest.is_empty() => SessionCommand::Status,
            "projects" if rest.is_empty() => SessionCommand::Projects,
            "help" if rest.is_empty() => SessionCommand::Help,
            "exit" | "quit" if rest.is_empty() => SessionCommand::Exit,
            "export" if rest.is_empty() => SessionCommand::Export(None),
            "export" => SessionCommand::Export(Some(PathBuf::from(rest))),
            _ => SessionCommand::SelectName(s.to_string()),
        })
    }
}

/// Runs an interactive session on stdin until `exit`, end of input or Ctrl-C. The running period
/// is saved in all three cases.
pub async fn run_session(paths: &AppPaths) -> Result<()> {
    let load = ProjectRegistry::load(&paths.config).context("Can't start a session")?;
    if load.dropped > 0 {
        println!(
            "Only the first {} projects are used, {} are ignored",
            load.registry.projects().len(),
            load.dropped
        );
    }
    if load.registry.is_empty() {
        bail!("Can't start a session without projects");
    }

    let storage = RecordStorageImpl::new(paths.records.clone())?;
    let mut session = TrackingSession::new(load.registry, storage, Box::new(DefaultClock));
    let mut stdout = std::io::stdout();
    print_projects(&session, &mut stdout)?;
    writeln!(stdout, "Type a number or a name to toggle a project, help for more")?;

    let token = CancellationToken::new();
    let input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let exports = paths.exports();

    let (_, result) = tokio::join!(detect_shutdown(token.clone()), async {
        let result = repl(&mut session, input, &mut stdout, &token, &exports).await;
        token.cancel();
        result
    });
    if let Err(e) = &result {
        error!("Session ended with an error {e:?}");
    }

    match session.exit().await {
        Ok(Some(record)) => println!(
            "Saved {} for {}",
            format_duration(record.duration_seconds),
            record.project_name
        ),
        Ok(None) => (),
        Err(e) => {
            error!("Failed to save the running period {e}");
            return Err(e.into());
        }
    }
    result
}

/// Reads commands from `input` until `exit`, end of input or cancellation. Failed commands are
/// reported to `out` and don't end the session.
pub async fn repl<R: RecordStorage>(
    session: &mut TrackingSession<R>,
    mut input: impl Stream<Item = std::io::Result<String>> + Unpin,
    out: &mut impl Write,
    token: &CancellationToken,
    export_root: &Path,
) -> Result<()> {
    loop {
        let line = select! {
            line = input.next() => line,
            _ = token.cancelled() => {
                info!("Session cancelled");
                break;
            }
        };
        let Some(line) = line else {
            info!("End of input");
            break;
        };

        let command = match line?.parse::<SessionCommand>() {
            Ok(command) => command,
            Err(e) => {
                writeln!(out, "{e}")?;
                continue;
            }
        };

        match command {
            SessionCommand::Select(index) => {
                let toggle = session.select(index).await;
                print_toggle(session, toggle, out)?;
            }
            SessionCommand::SelectName(name) => {
                let toggle = session.select_by_name(&name).await;
                print_toggle(session, toggle, out)?;
            }
            SessionCommand::Status => print_status(session, out)?,
            SessionCommand::Projects => print_projects(session, out)?,
            SessionCommand::Export(dir) => {
                let dir = dir.unwrap_or_else(|| default_export_dir(export_root, session.today()));
                match export(session, dir.clone()).await {
                    Ok(years) => writeln!(out, "Exported {years} years into {}", dir.display())?,
                    Err(e) => {
                        error!("Export failed {e:?}");
                        writeln!(out, "Export failed: {e}")?;
                    }
                }
            }
            SessionCommand::Help => writeln!(out, "{HELP}")?,
            SessionCommand::Exit => break,
            SessionCommand::Empty => (),
        }
    }
    Ok(())
}

async fn export<R: RecordStorage>(session: &TrackingSession<R>, dir: PathBuf) -> Result<usize> {
    let years = session.request_export(ExportRange::default()).await?;
    let mut sink = CsvDirectorySink::new(dir);
    for year in &years {
        sink.write_year(year)?;
    }
    sink.finish()?;
    Ok(years.len())
}

fn print_toggle<R: RecordStorage>(
    session: &TrackingSession<R>,
    toggle: Result<Toggle, SessionError>,
    out: &mut impl Write,
) -> Result<()> {
    let name = |index: usize| {
        session
            .registry()
            .get(index)
            .map(|p| p.name.to_string())
            .unwrap_or_default()
    };
    match toggle {
        Ok(Toggle::Started { project }) => writeln!(out, "Started {}", name(project))?,
        Ok(Toggle::Stopped { record }) => writeln!(
            out,
            "Stopped {} after {}",
            record.project_name,
            format_duration(record.duration_seconds)
        )?,
        Ok(Toggle::Switched { record, started }) => writeln!(
            out,
            "Stopped {} after {}, started {}",
            record.project_name,
            format_duration(record.duration_seconds),
            name(started)
        )?,
        Err(e) => writeln!(out, "{e}")?,
    }
    Ok(())
}

fn print_status<R: RecordStorage>(
    session: &TrackingSession<R>,
    out: &mut impl Write,
) -> Result<()> {
    match session.status() {
        Status::Idle => writeln!(out, "No project is running")?,
        Status::Active {
            project,
            started_at,
            elapsed_seconds,
        } => writeln!(
            out,
            "{} running since {} ({})",
            project.name,
            started_at.format("%H:%M:%S"),
            format_duration(elapsed_seconds)
        )?,
    }
    Ok(())
}

fn print_projects<R: RecordStorage>(
    session: &TrackingSession<R>,
    out: &mut impl Write,
) -> Result<()> {
    let active = match session.status() {
        Status::Active { project, .. } => Some(project.order_index),
        Status::Idle => None,
    };
    for project in session.registry().projects() {
        let marker = if active == Some(project.order_index) {
            "*"
        } else {
            " "
        };
        writeln!(
            out,
            "{marker}{:>2}  {}  {}",
            project.order_index + 1,
            paint(&project.color, "■■"),
            project.name
        )?;
    }
    Ok(())
}

fn format_duration(seconds: u64) -> String {
    let v = Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX));
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
