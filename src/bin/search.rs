//! Search binary entry point.
//!
//! Terminal front-end for the three interaction modes. Runs a single query or
//! an interactive REPL against the configured RediSearch index, printing a
//! table or JSON.
//!
//! # Examples
//!
//! Recommend papers for a passage:
//! ```bash
//! search --query "graph neural networks"
//! ```
//!
//! Identify the topic of a text, as JSON:
//! ```bash
//! search --mode topic --query "protein folding with deep learning" --format json
//! ```
//!
//! Interactive mode with a config file:
//! ```bash
//! search --config paper-vss.toml --interactive
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_vss::{
    config::AppConfig,
    models::RelevanceLevel,
    service::{Mode, PaperService},
    view::ModeView,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table with colored relevance levels
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Semantic paper search from the terminal
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Recommend papers, identify topics and answer questions from a paper index",
    long_about = "Query a RediSearch index of paper abstracts. Supports three modes \
                  (recommend, topic, answer), single-query and interactive use, and \
                  table or JSON output.

Connection settings come from paper-vss.toml (or --config) and PAPER_VSS__* \
environment variables, e.g. PAPER_VSS__REDIS__HOST and PAPER_VSS__REDIS__PASSWORD.

EXAMPLES:
  Recommend papers:
    search --query \"graph neural networks\"

  Topic of a text:
    search --mode topic --query \"protein folding with deep learning\"

  Ask a question:
    search --mode answer --query \"What is the Transformer based on?\"

  Interactive mode:
    search --interactive"
)]
struct Args {
    /// Configuration file (defaults to ./paper-vss.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Interaction mode: recommend, topic or answer
    #[arg(long, default_value = "recommend", value_parser = parse_mode)]
    mode: Mode,

    /// Query text (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

fn parse_mode(s: &str) -> std::result::Result<Mode, String> {
    s.parse()
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Shorten `text` to at most `max` characters.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn relevance_cell(relevance: RelevanceLevel) -> Cell {
    let color = match relevance {
        RelevanceLevel::Identical => Color::Green,
        RelevanceLevel::HighlySimilar => Color::Cyan,
        RelevanceLevel::Similar => Color::Yellow,
        RelevanceLevel::Relevant => Color::White,
    };
    Cell::new(relevance.label()).fg(color)
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

/// Format a view as a pretty table
fn format_view_table(view: &ModeView) -> String {
    if view.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match view {
        ModeView::Recommendation { papers, .. } => {
            table.set_header(header(&["Rank", "Title", "Authors", "Year", "Relevance", "Similarity"]));
            for (idx, paper) in papers.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(idx + 1),
                    Cell::new(truncate(&paper.title, 60)),
                    Cell::new(truncate(&paper.authors, 40)),
                    Cell::new(&paper.year),
                    relevance_cell(paper.relevance),
                    Cell::new(format!("{:.4}", paper.similarity)),
                ]);
            }
        }
        ModeView::Topic { topics, .. } => {
            table.set_header(header(&["Closest Paper", "Categories", "Relevance", "Similarity"]));
            for topic in topics {
                table.add_row(vec![
                    Cell::new(truncate(&topic.title, 60)),
                    Cell::new(topic.categories.join(", ")).add_attribute(Attribute::Bold),
                    relevance_cell(topic.relevance),
                    Cell::new(format!("{:.4}", topic.similarity)),
                ]);
            }
        }
        ModeView::Answer { answers, .. } => {
            table.set_header(header(&["Answer", "Source Paper", "Relevance", "Similarity"]));
            for card in answers {
                let answer = card.answer.as_deref().unwrap_or("(no answer: empty abstract)");
                table.add_row(vec![
                    Cell::new(answer).add_attribute(Attribute::Bold),
                    Cell::new(truncate(&card.title, 50)),
                    relevance_cell(card.relevance),
                    Cell::new(format!("{:.4}", card.similarity)),
                ]);
            }
        }
    }

    table.to_string()
}

/// Format a view as JSON
fn format_view_json(view: &ModeView) -> Result<String> {
    serde_json::to_string_pretty(view).with_context(|| "Failed to serialize results to JSON")
}

/// Display detailed view of a single result
fn display_result_detail(view: &ModeView, rank: usize) {
    let rule = "═".repeat(80);
    println!("\n{}", rule);
    println!("Rank: {}", rank);
    match view {
        ModeView::Recommendation { papers, .. } => {
            let paper = &papers[rank - 1];
            println!("Title: {}", paper.title);
            println!("Authors: {}", paper.authors);
            println!("Year: {}", paper.year);
            println!("Relevance: {}", paper.relevance.label());
            println!("Similarity: {:.4}", paper.similarity);
            println!("\nAbstract:\n{}", paper.abstract_text);
        }
        ModeView::Topic { topics, .. } => {
            let topic = &topics[rank - 1];
            println!("Title: {}", topic.title);
            println!("Categories: {}", topic.categories.join(", "));
            println!("Relevance: {}", topic.relevance.label());
            println!("Similarity: {:.4}", topic.similarity);
        }
        ModeView::Answer { answers, .. } => {
            let card = &answers[rank - 1];
            println!("Title: {}", card.title);
            match (&card.answer, card.answer_score) {
                (Some(answer), Some(score)) => println!("Answer: {} (confidence {:.3})", answer, score),
                (Some(answer), None) => println!("Answer: {}", answer),
                (None, _) => println!("Answer: (none)"),
            }
            println!("Relevance: {}", card.relevance.label());
            println!("\nAbstract:\n{}", card.abstract_text);
        }
    }
    println!("{}", rule);
}

fn print_view(view: &ModeView, format: OutputFormat, elapsed: std::time::Duration) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", view.mode().title());
            println!("{}", format_view_table(view));
            println!("\nFound {} results in {:.2}s", view.len(), elapsed.as_secs_f64());
        }
        OutputFormat::Json => println!("{}", format_view_json(view)?),
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  <text>          - Run the current mode on the text");
    println!("  /mode NAME      - Switch mode: recommend, topic or answer");
    println!("  /format table   - Use table output format");
    println!("  /format json    - Use JSON output format");
    println!("  /detail N       - Show full details for result rank N");
    println!("  /help           - Show this help");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Run interactive REPL mode
async fn run_interactive(service: PaperService, mut mode: Mode, mut format: OutputFormat) -> Result<()> {
    println!("Interactive Paper Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;
    let mut last_view: Option<ModeView> = None;

    loop {
        let readline = rl.readline(&format!("{}> ", mode.slug()));
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_help(),
                        "/mode" => {
                            if parts.len() < 2 {
                                println!("Current mode: {}", mode.title());
                                continue;
                            }
                            match parts[1..].join(" ").parse::<Mode>() {
                                Ok(new_mode) => {
                                    mode = new_mode;
                                    println!("Switched to {}", mode.title());
                                }
                                Err(e) => eprintln!("{}", e),
                            }
                        }
                        "/format" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /format [table|json]");
                                continue;
                            }
                            match parts[1] {
                                "table" => {
                                    format = OutputFormat::Table;
                                    println!("Set output format to table");
                                }
                                "json" => {
                                    format = OutputFormat::Json;
                                    println!("Set output format to JSON");
                                }
                                _ => eprintln!("Invalid format: must be 'table' or 'json'"),
                            }
                        }
                        "/detail" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /detail N");
                                continue;
                            }
                            let available = last_view.as_ref().map_or(0, ModeView::len);
                            match (parts[1].parse::<usize>(), &last_view) {
                                (Ok(rank), Some(view)) if rank > 0 && rank <= available => {
                                    display_result_detail(view, rank);
                                }
                                (Ok(rank), _) if rank > available => {
                                    eprintln!(
                                        "Rank {} out of range (last search had {} results)",
                                        rank, available
                                    );
                                }
                                _ => eprintln!("Invalid rank: must be a positive integer"),
                            }
                        }
                        _ => eprintln!("Unknown command: {}. Type /help for available commands.", parts[0]),
                    }
                } else {
                    let start = Instant::now();
                    match service.run(mode, line).await {
                        Ok(Some(view)) => {
                            if let Err(e) = print_view(&view, format, start.elapsed()) {
                                eprintln!("Error formatting results: {}", e);
                            }
                            last_view = Some(view);
                        }
                        Ok(None) => {}
                        Err(e) if e.is_transient() => {
                            eprintln!("Search failed: {} (try again shortly)", e);
                        }
                        Err(e) => eprintln!("Search failed: {}", e),
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query(service: PaperService, mode: Mode, query: &str, format: OutputFormat) -> Result<()> {
    let start = Instant::now();
    let view = service
        .run(mode, query)
        .await
        .with_context(|| format!("Failed to execute {} for query: '{}'", mode.title(), query))?;

    match view {
        Some(view) => print_view(&view, format, start.elapsed())?,
        None => eprintln!("Empty query, nothing to search for."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    setup_logging(&args.log_level);

    let query = match (args.interactive, args.query) {
        (false, None) => anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        ),
        (_, query) => query,
    };

    let mut config = AppConfig::load(args.config.as_deref()).with_context(|| "Failed to load configuration")?;
    if let Some(cache_dir) = args.cache_dir {
        config.embedding.cache_dir = Some(cache_dir);
    }

    info!("Connecting to {}", config.redis.redacted_url());
    let service = PaperService::from_config(&config)
        .await
        .with_context(|| format!("Failed to connect to search index '{}'", config.redis.index_name))?;

    service
        .verify()
        .await
        .with_context(|| format!("Embedding model '{}' cannot be used with this index", config.embedding.model))?;

    info!("Embedding model ready");

    match query {
        Some(query) => run_single_query(service, args.mode, &query, args.format).await?,
        None => run_interactive(service, args.mode, args.format).await?,
    }

    Ok(())
}
