//! tether: a line-oriented front end for the `tetherpdb` debugger.
//!
//! Stdout belongs to the debugged program; everything tether itself has
//! to say goes to stderr, and diagnostics go to a log file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use tether_core::breakpoint::BreakpointSpec;
use tether_core::logging;
use tether_protocol::variables::Variable;
use tether_session::{DebugSession, LaunchConfig, SessionError, SessionEvent};

fn print_usage() {
    eprintln!("usage: tether [--config FILE] [-b LINE]... SCRIPT [ARGS...]");
    eprintln!();
    eprintln!("interactive commands:");
    eprintln!("  n  step over        s  step into       c  continue");
    eprintln!("  w  stack trace      v  variables       q  quit");
    eprintln!("anything else is forwarded to the program while it runs");
}

#[derive(Debug, PartialEq)]
struct Options {
    config: Option<PathBuf>,
    breakpoints: Vec<u32>,
    script: PathBuf,
    args: Vec<String>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut config = None;
        let mut breakpoints = Vec::new();
        let mut script: Option<PathBuf> = None;
        let mut rest = Vec::new();
        while let Some(arg) = args.next() {
            if script.is_some() {
                rest.push(arg);
                continue;
            }
            match arg.as_str() {
                "--config" => {
                    config = Some(PathBuf::from(
                        args.next().context("--config needs a path")?,
                    ));
                }
                "-b" | "--break" => {
                    let line: u32 = args
                        .next()
                        .context("-b needs a line number")?
                        .parse()
                        .context("breakpoint line must be a positive number")?;
                    breakpoints.push(line);
                }
                _ => script = Some(PathBuf::from(arg)),
            }
        }
        Ok(Self {
            config,
            breakpoints,
            script: script.context("missing script to debug")?,
            args: rest,
        })
    }
}

fn init_logging() -> Result<PathBuf> {
    let path = logging::default_log_file_path();
    logging::ensure_log_dir(&path)?;
    logging::rotate_log_files(
        &path,
        logging::DEFAULT_MAX_LOG_SIZE,
        logging::DEFAULT_MAX_LOG_FILES,
    )?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    let level = std::env::var("TETHER_LOG").unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            logging::log_level_to_filter(&level),
        ))
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

/// The companion python modules are looked up next to the executable when
/// the configured directory does not exist relative to the working
/// directory.
fn resolve_lib_dir(configured: &Path) -> PathBuf {
    if configured.is_dir() {
        return configured.to_path_buf();
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join(configured);
            if candidate.is_dir() {
                return candidate;
            }
        }
    }
    configured.to_path_buf()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") || args.is_empty() {
        print_usage();
        return Ok(());
    }
    let options = Options::parse(args.into_iter())?;

    let log_path = init_logging()?;
    info!(log = %log_path.display(), "tether starting");

    let mut config = match &options.config {
        Some(path) => LaunchConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LaunchConfig::default(),
    };
    config.file = std::fs::canonicalize(&options.script).unwrap_or(options.script);
    config.args = options.args;
    config.lib_dir = resolve_lib_dir(&config.lib_dir);

    let breakpoints: Vec<BreakpointSpec> = options
        .breakpoints
        .iter()
        .map(|&line| BreakpointSpec {
            file: config.file.clone(),
            line,
        })
        .collect();

    let session = Arc::new(DebugSession::spawn(&config, breakpoints)?);

    let mut events = session.events();
    let mut printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            match events.recv().await {
                Ok(SessionEvent::Output { data, stderr }) => {
                    if stderr {
                        eprint!("{}", String::from_utf8_lossy(&data));
                    } else {
                        let _ = stdout.write_all(&data).await;
                        let _ = stdout.flush().await;
                    }
                }
                Ok(SessionEvent::StateChanged { state, position }) => {
                    match &position {
                        Some(position) if !state.is_terminal() => {
                            eprintln!("[tether] {state} at {position}")
                        }
                        _ => eprintln!("[tether] {state}"),
                    }
                    if state.is_terminal() {
                        break;
                    }
                }
                Ok(SessionEvent::BreakpointError { detail }) => {
                    eprintln!("[tether] breakpoint refused: {detail}");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = &mut printer => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim().to_string();
                if line == "q" {
                    break;
                }
                if let Err(e) = dispatch(&session, &line).await {
                    eprintln!("[tether] {e}");
                }
            }
        }
    }

    session.stop().await;
    info!("tether exiting");
    Ok(())
}

async fn dispatch(session: &DebugSession, line: &str) -> Result<(), SessionError> {
    match line {
        "" => Ok(()),
        "n" => session.step_over(),
        "s" => session.step_into(),
        "c" => session.continue_run(),
        "w" => {
            let trace = session.get_stack_trace().await?;
            eprint!("{trace}");
            Ok(())
        }
        "v" => {
            let (mut locals, mut globals) = session.get_variables().await?;
            locals.set_identifier("locals".to_string());
            globals.set_identifier("globals".to_string());
            render(&mut locals, 0);
            render(&mut globals, 0);
            Ok(())
        }
        other => session.write_stdin(&format!("{other}\n")),
    }
}

/// Print a variable tree to stderr, expanding container identifiers as
/// it descends.
fn render(var: &mut Variable, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = var.identifier().unwrap_or("?").to_string();
    match var {
        Variable::Primitive(p) => eprintln!("{indent}{name}: {} = {}", p.ty, p.value),
        Variable::Complex(c) => {
            c.fill_child_identifiers();
            eprintln!("{indent}{name}: {}", c.ty);
            for child in &mut c.values {
                render(child, depth + 1);
            }
        }
    }
}
