use std::env;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;

use chatstate_core::config::Config;
use chatstate_core::config::CONFIG_FILE_NAME;
use chatstate_core::dispatcher::Applied;
use chatstate_core::dispatcher::EventDispatcher;
use chatstate_core::dispatcher::StateSnapshot;
use chatstate_core::event::ServerEvent;
use chatstate_core::scope::SessionScope;
use chatstate_core::transcript::replay_from;
use chatstate_core::transcript::EventTranscript;
use chatstate_core::transcript::ReplayStats;
use chatstate_core::transcript::TranscriptSnapshot;
use chatstate_core::transcript::TRANSCRIPT_SNAPSHOT_VERSION;
use tracing::info;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "CHATSTATE_CONFIG";

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("chatstate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "replay" => {
            let config = load_config()?;
            init_tracing(&config);
            let args = parse_replay_args(args.collect::<Vec<_>>())?;
            run_replay(&config, args)
        }
        "apply" => {
            let config = load_config()?;
            init_tracing(&config);
            let args = parse_apply_args(args.collect::<Vec<_>>())?;
            run_apply(&config, args)
        }
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayArgs {
    transcript: Option<PathBuf>,
    session: Option<String>,
    resume: bool,
    checkpoint: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ApplyArgs {
    session: Option<String>,
    record: Option<PathBuf>,
}

fn parse_replay_args(args: Vec<String>) -> Result<ReplayArgs, Box<dyn std::error::Error>> {
    let mut parsed = ReplayArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--session" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--session requires a session id".into());
                };
                parsed.session = Some(value.clone());
                i += 2;
            }
            "--resume" => {
                parsed.resume = true;
                i += 1;
            }
            "--checkpoint" => {
                parsed.checkpoint = true;
                i += 1;
            }
            other if other.starts_with("--") => {
                return Err(format!("unsupported argument: {other}").into());
            }
            path => {
                if parsed.transcript.is_some() {
                    return Err(format!("unexpected extra path: {path}").into());
                }
                parsed.transcript = Some(PathBuf::from(path));
                i += 1;
            }
        }
    }
    Ok(parsed)
}

fn parse_apply_args(args: Vec<String>) -> Result<ApplyArgs, Box<dyn std::error::Error>> {
    let mut parsed = ApplyArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--session" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--session requires a session id".into());
                };
                parsed.session = Some(value.clone());
                i += 2;
            }
            "--record" => {
                let Some(value) = args.get(i + 1) else {
                    return Err("--record requires a path".into());
                };
                parsed.record = Some(PathBuf::from(value));
                i += 2;
            }
            other => {
                return Err(format!("unsupported argument: {other}").into());
            }
        }
    }
    Ok(parsed)
}

fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("chatstate").join(CONFIG_FILE_NAME))
}

fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    match config_path() {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(env_filter);
    if let Err(err) = tracing_subscriber::registry().with(fmt_layer).try_init() {
        eprintln!("warning: logging already initialized: {err}");
    }
}

/// Diff scoping is opt-in: an explicit `--session`, or the config flag plus a session id.
fn session_scope(
    config: &Config,
    session: Option<String>,
) -> Result<Option<SessionScope>, Box<dyn std::error::Error>> {
    match session {
        Some(session) => Ok(Some(SessionScope::new(session))),
        None if config.diffs.scope_to_session => {
            Err("diffs.scope_to_session is enabled; pass --session <id>".into())
        }
        None => Ok(None),
    }
}

fn run_replay(config: &Config, args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = args.transcript.or_else(|| config.transcript.path.clone()) else {
        return Err("replay requires a transcript path (argument or transcript.path)".into());
    };
    let scope = session_scope(config, args.session)?;
    let transcript = EventTranscript::open(&path)?;

    let resumed = if args.resume {
        transcript.load_snapshot()?
    } else {
        None
    };
    let (start, since) = match resumed {
        Some(snapshot) => {
            info!(seq = snapshot.seq, "resuming from snapshot");
            (EventDispatcher::from_snapshot(snapshot.state), snapshot.seq)
        }
        None => (EventDispatcher::new(), 0),
    };
    let records = transcript.load_since(since)?;
    let last_seq = records.iter().map(|record| record.seq).max().unwrap_or(since);
    let (dispatcher, stats) = replay_from(start, &records, scope.as_ref());

    if args.checkpoint {
        transcript.save_snapshot(&TranscriptSnapshot {
            version: TRANSCRIPT_SNAPSHOT_VERSION,
            seq: last_seq,
            state: dispatcher.snapshot(),
        })?;
        info!(seq = last_seq, "snapshot saved");
    }

    print_snapshot(&dispatcher.snapshot())?;
    print_stats(&stats);
    Ok(())
}

fn run_apply(config: &Config, args: ApplyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scope = session_scope(config, args.session)?;
    let mut recorder = match args.record {
        Some(path) => Some(EventTranscript::open(path)?),
        None => None,
    };
    let mut dispatcher = EventDispatcher::new();
    let mut stats = ReplayStats::default();

    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = match ServerEvent::from_json(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!(line = index + 1, error = %err, "skipping undecodable frame");
                stats.undecodable += 1;
                continue;
            }
        };
        if let Some(recorder) = recorder.as_mut() {
            recorder.append(&event)?;
        }
        let applied = match scope.as_ref() {
            Some(scope) => scope.apply(&mut dispatcher, &event),
            None => Some(dispatcher.apply(&event)),
        };
        match applied {
            Some(Applied::Permissions | Applied::Diffs) => stats.applied += 1,
            Some(Applied::Unchanged) => stats.unchanged += 1,
            None => stats.filtered += 1,
        }
    }

    print_snapshot(&dispatcher.snapshot())?;
    print_stats(&stats);
    Ok(())
}

fn print_snapshot(snapshot: &StateSnapshot) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, snapshot)?;
    writeln!(stdout)?;
    Ok(())
}

fn print_stats(stats: &ReplayStats) {
    eprintln!(
        "applied {} | unchanged {} | filtered {} | undecodable {}",
        stats.applied, stats.unchanged, stats.filtered, stats.undecodable
    );
}

fn print_help() {
    println!("chatstate {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  chatstate replay [PATH] [--session ID] [--resume] [--checkpoint]");
    println!("  chatstate apply [--session ID] [--record PATH] < events.jsonl");
    println!("  chatstate --help");
    println!("  chatstate --version");
}
