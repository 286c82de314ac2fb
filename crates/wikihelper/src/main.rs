use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wikihelper_core::chapters::{
    ChapterDatesOptions, ChapterDatesReport, extract_chapter_dates_from_file, render_array_literal,
    render_lua_entries,
};
use wikihelper_core::config::{
    CONFIG_ENV_VAR, HelperConfig, ResolvedConfigPath, load_config, resolve_config_path,
};
use wikihelper_core::import::{TweakOptions, tweak_export_file, tweaked_filename};
use wikihelper_core::twitter::{
    TwitterSearchOptions, generate_twitter_searches_file, parsed_filename,
};

#[derive(Debug, Parser)]
#[command(
    name = "wikihelper",
    version,
    about = "Batch helpers for maintaining the BokuYaba wiki from XML dumps and date lists"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print reports as JSON")]
    json: bool,
    #[arg(long, global = true, help = "Print resolved config diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    json: bool,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            json: cli.json,
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(
        name = "chapter-dates",
        about = "Print chapter publication dates found in a wiki XML dump"
    )]
    ChapterDates(ChapterDatesArgs),
    #[command(
        name = "tweak-revisions",
        about = "Add import attribution to every revision comment of a Wikipedia export"
    )]
    TweakRevisions(TweakRevisionsArgs),
    #[command(
        name = "twitter-searches",
        about = "Turn a list of ISO dates into wikitext lines of x.com searches"
    )]
    TwitterSearches(TwitterSearchesArgs),
}

#[derive(Debug, Args)]
struct ChapterDatesArgs {
    #[arg(value_name = "DUMP")]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct TweakRevisionsArgs {
    #[arg(value_name = "EXPORT")]
    input: PathBuf,
    #[arg(long, value_name = "PATH", help = "Write here instead of <EXPORT>-FOR-IMPORT.xml")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TwitterSearchesArgs {
    #[arg(value_name = "DATES")]
    input: PathBuf,
    #[arg(long, value_name = "PATH", help = "Write here instead of <DATES>-parsed.txt")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Commands::ChapterDates(args) => run_chapter_dates(&runtime, args),
        Commands::TweakRevisions(args) => run_tweak_revisions(&runtime, args),
        Commands::TwitterSearches(args) => run_twitter_searches(&runtime, args),
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_chapter_dates(runtime: &RuntimeOptions, args: ChapterDatesArgs) -> Result<()> {
    let (config, resolved) = load_runtime_config(runtime)?;
    let options = ChapterDatesOptions::from_config(&config);
    let report = extract_chapter_dates_from_file(&args.input, &options)?;

    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_chapter_dates(&args.input, &report);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", resolved.diagnostics());
    }
    Ok(())
}

fn print_chapter_dates(input: &Path, report: &ChapterDatesReport) {
    println!("chapter dates");
    println!("input: {}", normalize_path(input));
    println!("pages_scanned: {}", report.pages_scanned);
    println!("pages_with_marker: {}", report.pages_with_marker.len());
    for title in &report.pages_with_marker {
        println!("pages_with_marker.title: {title}");
    }
    println!("failures.count: {}", report.failures.len());
    for failure in &report.failures {
        println!("failures.title: {} ({})", failure.title, failure.message);
    }
    println!("dated: {}", report.table.entries().count());
    println!("table: {}", render_array_literal(&report.table));
    println!();
    print!("{}", render_lua_entries(&report.table));
}

fn run_tweak_revisions(runtime: &RuntimeOptions, args: TweakRevisionsArgs) -> Result<()> {
    let (config, resolved) = load_runtime_config(runtime)?;
    let options = TweakOptions::from_config(&config);
    let output = args
        .output
        .unwrap_or_else(|| tweaked_filename(&args.input, &options.output_suffix));
    let report = tweak_export_file(&args.input, &output, &options)?;

    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("tweak revisions");
        println!("input: {}", normalize_path(&args.input));
        println!("output: {}", normalize_path(&output));
        println!("interwiki: {}", options.interwiki);
        println!("revisions: {}", report.revisions);
        println!("comments_added: {}", report.comments_added);
        println!("comments_prefixed: {}", report.comments_prefixed);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", resolved.diagnostics());
    }
    Ok(())
}

fn run_twitter_searches(runtime: &RuntimeOptions, args: TwitterSearchesArgs) -> Result<()> {
    let (config, resolved) = load_runtime_config(runtime)?;
    let options = TwitterSearchOptions::from_config(&config);
    let output = match args.output {
        Some(output) => output,
        None => parsed_filename(&args.input)?,
    };
    let report = generate_twitter_searches_file(&args.input, &output, &options)?;

    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("twitter searches");
        println!("input: {}", normalize_path(&args.input));
        println!("output: {}", report.output);
        println!("dates: {}", report.dates);
        println!("pairs: {}", report.pairs);
        println!("lines: {}", report.lines);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", resolved.diagnostics());
    }
    Ok(())
}

fn load_runtime_config(runtime: &RuntimeOptions) -> Result<(HelperConfig, ResolvedConfigPath)> {
    dotenvy::dotenv().ok();

    let cwd = env::current_dir().context("failed to read current directory")?;
    let resolved = resolve_config_path(
        runtime.config.as_deref(),
        env::var(CONFIG_ENV_VAR).ok(),
        &cwd,
    );
    debug!(
        config = %normalize_path(&resolved.path),
        source = resolved.source.as_str(),
        "resolved config path"
    );
    let config = load_config(&resolved.path)?;
    Ok((config, resolved))
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
