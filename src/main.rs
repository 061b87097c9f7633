//! FinderQA - natural-language questions over the Finder sales data
//!
//! A CLI tool that loads the yearly sales exports, resolves each question
//! into one analytical operation, runs it locally and has a language model
//! phrase the anonymized result.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, unreadable data, a failed question)
//!   2 - Dataset incomplete in one-shot mode

mod agent;
mod analytics;
mod cli;
mod config;
mod data;
mod error;
mod models;
mod report;
mod session;

use agent::{
    build_completion_service, IntentClassifier, LlmIntentClassifier, LlmPhraser, Phraser,
    RuleBasedClassifier, TemplatePhraser,
};
use analytics::Dashboard;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use data::{discover_csv_files, LoaderOptions};
use indicatif::{ProgressBar, ProgressStyle};
use report::{Transcript, TranscriptMetadata};
use session::{LoadStatus, Session};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // The config file can turn on verbose logging, so it is read first
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("FinderQA v{}", env!("CARGO_PKG_VERSION"));
    match config_source {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Session failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .finderqa.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to choose the provider, model, expected years and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from `--config`, the default file, or defaults.
///
/// Also returns the file the configuration came from, if any.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, Some(config_path.clone())));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, Some(PathBuf::from(CONFIG_FILE_NAME)))),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE_NAME, e);
            Ok((Config::default(), None))
        }
    }
}

/// Build the two collaborators and a description of the model behind them.
fn build_collaborators(
    config: &Config,
) -> Result<(Box<dyn IntentClassifier>, Box<dyn Phraser>, String)> {
    if config.general.offline {
        println!("🤖 Offline mode: keyword intent rules and template answers");
        return Ok((
            Box::new(RuleBasedClassifier::new()),
            Box::new(TemplatePhraser::new()),
            "offline".to_string(),
        ));
    }

    let service = build_completion_service(&config.model)?;
    let description = service.describe();

    println!("🤖 Language model: {}", description);
    println!("   Endpoint: {}", config.model.effective_base_url());
    println!("   Timeout: {}s", config.model.timeout_seconds);

    Ok((
        Box::new(LlmIntentClassifier::new(Arc::clone(&service))),
        Box::new(LlmPhraser::new(service)),
        description,
    ))
}

/// Run the session. Returns exit code (0, 1 when a question failed, or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();
    let started_at = Utc::now();

    let (classifier, phraser, model_used) = build_collaborators(&config)?;

    let mut session = Session::new(
        config.data.expected_years.clone(),
        LoaderOptions::from(&config.data),
        classifier,
        phraser,
    );

    // Step 1: Register the data files
    let mut files = args.data.clone();
    if let Some(ref dir) = args.data_dir {
        let found = discover_csv_files(dir, config.data.scan_depth);
        info!("Found {} CSV files in {}", found.len(), dir.display());
        files.extend(found);
    }

    if !files.is_empty() {
        println!("\n📥 Loading sales data...");
        register_files(&mut session, &files);
        if args.is_one_shot() {
            report_load_status(session.try_load()?);
        } else if let Err(e) = session.try_load().map(report_load_status) {
            eprintln!("❌ {}", e);
        }
    }

    // Step 2: Answer questions
    let spinner_enabled = !args.quiet && !config.general.offline;

    let failed_turns = if args.is_one_shot() {
        if session.table().is_none() {
            let missing = session.uploads().missing_years();
            eprintln!(
                "\n⛔ Dataset incomplete, missing files for: {:?}. Failing (exit code 2).",
                missing
            );
            return Ok(2);
        }

        answer_questions(&mut session, &args.ask, spinner_enabled).await
    } else {
        run_repl(&mut session, spinner_enabled).await?;
        0
    };

    // Step 3: Exports
    let duration = start_time.elapsed().as_secs_f64();
    write_exports(&session, &args, &config, model_used, started_at, duration)?;

    if failed_turns > 0 {
        eprintln!(
            "\n⚠️  {} of {} questions could not be answered.",
            failed_turns,
            args.ask.len()
        );
        return Ok(1);
    }

    Ok(0)
}

/// Offer files to the session and print per-file results.
fn register_files(session: &mut Session, files: &[PathBuf]) {
    let report = session.add_files(files);

    for (year, path) in &report.accepted {
        println!("   📄 {} → {}", path.display(), year);
    }
    for problem in &report.rejected {
        eprintln!("   ⚠️  {}", problem);
    }
}

fn report_load_status(status: LoadStatus) {
    match status {
        LoadStatus::Ready { rows } => {
            println!("✅ Dataset ready: {} rows", rows);
        }
        LoadStatus::Waiting { missing } => {
            let years: Vec<String> = missing.iter().map(i32::to_string).collect();
            println!("⏳ Waiting for files for: {}", years.join(", "));
        }
    }
}

fn start_spinner(enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Consultando al modelo...");
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

async fn ask_and_print(session: &mut Session, question: &str, spinner_enabled: bool) -> Result<()> {
    println!("\n❓ {}", question);

    let spinner = start_spinner(spinner_enabled);
    let outcome = session.ask(question).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let turn = outcome?;
    println!("💬 {}", turn.answer);
    Ok(())
}

/// Ask every question in turn. A failed question does not stop the rest.
///
/// Returns how many questions failed.
async fn answer_questions(session: &mut Session, questions: &[String], spinner_enabled: bool) -> usize {
    let mut failed = 0;

    for question in questions {
        if let Err(e) = ask_and_print(session, question, spinner_enabled).await {
            error!("Question failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            failed += 1;
        }
    }

    failed
}

const REPL_HELP: &str = "Comandos:
  /load <archivos...>  agregar archivos anuales (CSV)
  /context             mostrar el contexto actual
  /reset               olvidar el contexto
  /help                mostrar esta ayuda
  /quit                salir
Cualquier otro texto se toma como una pregunta sobre las ventas.";

/// Interactive chat on stdin until `/quit` or end of input.
async fn run_repl(session: &mut Session, spinner_enabled: bool) -> Result<()> {
    println!("\n💬 Pregúntame sobre ventas. Escribe /help para ver los comandos.");
    if session.uploads().is_empty() {
        println!("   Primero carga los archivos anuales con /load <archivos...>");
    } else if session.table().is_none() {
        let years: Vec<String> = session
            .uploads()
            .missing_years()
            .iter()
            .map(i32::to_string)
            .collect();
        println!("   Faltan archivos para: {}", years.join(", "));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read from stdin")? else {
            break;
        };
        let line = line.trim();

        match line.split_whitespace().next() {
            None => continue,
            Some("/quit") | Some("/exit") | Some("/salir") => break,
            Some("/help") => println!("{}", REPL_HELP),
            Some("/context") => {
                if session.context().is_empty() {
                    println!("(sin contexto)");
                } else {
                    println!("{}", session.context().to_json());
                }
            }
            Some("/reset") => {
                session.reset_context();
                println!("🧹 Contexto reiniciado");
            }
            Some("/load") => {
                let paths: Vec<PathBuf> = line.split_whitespace().skip(1).map(PathBuf::from).collect();
                if paths.is_empty() {
                    println!("Uso: /load <archivos...>");
                    continue;
                }
                register_files(session, &paths);
                match session.try_load() {
                    Ok(status) => report_load_status(status),
                    Err(e) => eprintln!("❌ {}", e),
                }
            }
            Some(command) if command.starts_with('/') => {
                println!("Comando desconocido: {}. Escribe /help.", command);
            }
            Some(_) => {
                if let Err(e) = ask_and_print(session, line, spinner_enabled).await {
                    warn!("Turn failed: {:#}", e);
                    eprintln!("❌ {:#}", e);
                }
            }
        }
    }

    Ok(())
}

/// Write the transcript and dashboard files that were asked for.
fn write_exports(
    session: &Session,
    args: &Args,
    config: &Config,
    model_used: String,
    started_at: DateTime<Utc>,
    duration_seconds: f64,
) -> Result<()> {
    if let Some(ref path) = config.report.transcript {
        let transcript = Transcript {
            metadata: TranscriptMetadata {
                model_used,
                started_at,
                files: session
                    .uploads()
                    .files()
                    .map(|(year, file)| (*year, file.path.display().to_string()))
                    .collect(),
                rows: session.table().map(|t| t.len()).unwrap_or(0),
                duration_seconds,
            },
            turns: session.turns().to_vec(),
        };

        let output = match args.format {
            OutputFormat::Json => report::generate_json_transcript(&transcript)?,
            OutputFormat::Markdown => {
                report::generate_markdown_transcript(&transcript, config.report.include_intents)
            }
        };
        report::write_output(path, &output)?;
        println!("\n📝 Transcript saved to: {}", path.display());
    }

    if let Some(ref path) = config.report.dashboard {
        let Some(table) = session.table() else {
            warn!("No dataset loaded, skipping dashboard");
            return Ok(());
        };

        let dashboard = Dashboard::build(table, args.family.as_deref());
        let output = match args.format {
            OutputFormat::Json => report::generate_json_dashboard(&dashboard)?,
            OutputFormat::Markdown => report::generate_markdown_dashboard(&dashboard),
        };
        report::write_output(path, &output)?;
        println!("📊 Dashboard saved to: {}", path.display());
    }

    Ok(())
}
