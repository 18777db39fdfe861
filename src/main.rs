use clap::Parser;
use flyto_index::cli::{Args, Command};
use flyto_index::indexer::scan::ScanOptions;
use flyto_index::model::Project;
use flyto_index::{query, CancelFlag, Engine, EngineError};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("flyto-index: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, EngineError> {
    match args.command {
        Command::Scan {
            root,
            projects,
            no_ignore,
            max_file_bytes,
        } => {
            let mut engine = open_engine(root, &projects)?;
            let max = max_file_bytes
                .unwrap_or_else(|| flyto_index::config::Config::get().max_file_bytes);
            engine.set_scan_options(ScanOptions::new(no_ignore, max));
            let summary = engine.scan(&CancelFlag::new())?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            engine.shutdown()?;
            if summary.parse_errors > 0 {
                return Ok(ExitCode::from(3));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Impact {
            root,
            symbol,
            depth,
        } => {
            let engine = open_engine(root, &[])?;
            let depth =
                depth.unwrap_or_else(|| flyto_index::config::Config::get().impact_depth);
            let result = query::impact(&engine.snapshot(), &symbol, depth)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::References { root, symbol } => {
            let engine = open_engine(root, &[])?;
            let result = query::references(&engine.snapshot(), &symbol)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Search { root, query, limit } => {
            let engine = open_engine(root, &[])?;
            let results = engine.with_session(|session| {
                session.searched(&query);
                flyto_index::query::search(&engine.snapshot(), session, &query, limit)
            });
            println!("{}", serde_json::to_string_pretty(&results)?);
            engine.shutdown()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::FileInfo { root, path } => {
            let engine = open_engine(root, &[])?;
            let project_map = engine.store().load_project_map()?;
            let info = query::file_info(&engine.snapshot(), &project_map, &path)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Apis { root } => {
            let engine = open_engine(root, &[])?;
            let entries = query::apis(&engine.snapshot());
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_engine(root: PathBuf, extra_projects: &[String]) -> Result<Engine, EngineError> {
    if extra_projects.is_empty() {
        return Engine::open(root);
    }
    let name = root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace")
        .to_string();
    let store_dir = root.join(".flyto-index");
    let mut projects = vec![Project::new(name, root)];
    for spec in extra_projects {
        let (name, path) = spec.split_once('=').ok_or_else(|| {
            EngineError::Input(format!("bad --project value (want NAME=PATH): {spec}"))
        })?;
        projects.push(Project::new(name.to_string(), PathBuf::from(path)));
    }
    Engine::open_workspace(projects, store_dir)
}
