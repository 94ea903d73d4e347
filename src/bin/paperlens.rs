//! CLI binary for paperlens.
//!
//! A thin shim over the library crate: each subcommand maps onto one library
//! operation and prints the result.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use paperlens::pipeline::input;
use paperlens::{
    cloud, AiConfig, ChatSession, CloudConfig, Document, DocumentStatus, Filter,
    IngestOutcome, IngestProgressCallback, Ingestor, KvStore, Language, Library, PdfiumExtractor,
    ProgressCallback, Provider, TextExtractor,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the batch plus a log line per
/// lifecycle step. Documents finish out of order, so timings are per id.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} papers  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analysing");
        self.bar.reset();
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn elapsed(&self, id: &str) -> String {
        let secs = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Ingesting {total} paper(s)…"))
        ));
    }

    fn on_skipped(&self, name: &str, reason: &str) {
        self.bar
            .println(format!("  {} {}  {}", dim("–"), name, dim(&format!("skipped: {reason}"))));
    }

    fn on_status(&self, id: &str, name: &str, status: DocumentStatus) {
        if status == DocumentStatus::New {
            if let Ok(mut t) = self.start_times.lock() {
                t.insert(id.to_string(), Instant::now());
            }
        }
        self.bar.set_message(format!("{name}: {}", status.label()));
    }

    fn on_document_complete(&self, id: &str, title: &str) {
        self.bar
            .println(format!("  {} {}  {}", green("✓"), title, self.elapsed(id)));
        self.bar.inc(1);
    }

    fn on_document_error(&self, id: &str, name: &str, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            self.elapsed(id)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} paper(s) analysed", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} paper(s) analysed  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Configure a key once, then analyse papers
  paperlens config set-key gemini AIza...
  paperlens add attention.pdf bert.pdf

  # Analyse a paper by URL (Gemini search grounding)
  paperlens add-url https://arxiv.org/abs/1706.03762

  # Browse and organise
  paperlens list --favorites
  paperlens show 3f2a
  paperlens tag 3f2a "Transformers"
  paperlens collection create "Reading group"

  # Ask follow-up questions
  paperlens chat 3f2a "How does the positional encoding work?"

  # Back up and restore
  paperlens export backup.json
  paperlens import backup.json

PROVIDERS:
  gemini (schema-enforced, 500k chars)   siliconflow (500k chars)
  openai  minimax  moonshot  zhipu  deepseek  qwen   (100k chars)
  Run `paperlens models` for the model catalogue.

ENVIRONMENT VARIABLES:
  PAPERLENS_DB            Library database (default: <data dir>/paperlens/library.db)
  PAPERLENS_PROVIDER      Provider for this run (does not change the stored setting)
  PAPERLENS_MODEL         Model for this run
  GEMINI_API_KEY, OPENAI_API_KEY, SILICONFLOW_API_KEY, MINIMAX_API_KEY,
  MOONSHOT_API_KEY, ZHIPU_API_KEY, DEEPSEEK_API_KEY, QWEN_API_KEY
                          Used when no key is stored for that provider
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Analyse research papers with LLMs and keep them in a local library.
#[derive(Parser, Debug)]
#[command(
    name = "paperlens",
    version,
    about = "Analyse research papers with LLMs and keep them in a local library",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Library database file.
    #[arg(long, global = true, env = "PAPERLENS_DB")]
    db: Option<PathBuf>,

    /// Provider for this run: gemini, openai, siliconflow, minimax, moonshot, zhipu, deepseek, qwen.
    #[arg(long, global = true, env = "PAPERLENS_PROVIDER")]
    provider: Option<String>,

    /// Model id for this run.
    #[arg(long, global = true, env = "PAPERLENS_MODEL")]
    model: Option<String>,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PAPERLENS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAPERLENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAPERLENS_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse local PDF files (arguments starting with http(s):// are
    /// analysed as paper URLs).
    Add {
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Password for encrypted PDFs.
        #[arg(long, env = "PAPERLENS_PDF_PASSWORD")]
        password: Option<String>,
    },
    /// Analyse a paper from its URL.
    AddUrl { url: String },
    /// List documents.
    List {
        #[arg(long)]
        favorites: bool,
        /// Collection id (or unique prefix).
        #[arg(long, conflicts_with = "favorites")]
        collection: Option<String>,
        #[arg(long, conflicts_with_all = ["favorites", "collection"])]
        tag: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show a document's analysis and mark it read.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Add (or with --remove, remove) a tag.
    Tag {
        id: String,
        tag: String,
        #[arg(long)]
        remove: bool,
    },
    /// Replace a document's notes.
    Note { id: String, text: String },
    /// Toggle the favourite flag.
    Fav { id: String },
    /// Delete a document (and its cloud copy).
    Delete { id: String },
    /// Manage collections.
    #[command(subcommand)]
    Collection(CollectionCmd),
    /// Show or change AI settings.
    #[command(subcommand)]
    Config(ConfigCmd),
    /// List the model catalogue.
    Models { provider: Option<String> },
    /// Cloud mirror.
    #[command(subcommand)]
    Cloud(CloudCmd),
    /// Ask questions about an analysed paper. Without a question, reads
    /// questions from stdin until EOF.
    Chat { id: String, question: Option<String> },
    /// Write the library to a JSON file.
    Export { path: PathBuf },
    /// Load a JSON backup.
    Import { path: PathBuf },
    /// Print the text extracted from a PDF (no API key needed).
    Extract {
        path: PathBuf,
        #[arg(long, env = "PAPERLENS_PDF_PASSWORD")]
        password: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CollectionCmd {
    List,
    Create { name: String },
    Rename { id: String, name: String },
    Delete { id: String },
    /// Put a document in a collection.
    Add { collection: String, document: String },
    /// Take a document out of a collection.
    Remove { collection: String, document: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    Show,
    /// Store the API key of a provider.
    SetKey { provider: String, key: String },
    /// Make a provider (and optionally a model) the default.
    SetProvider {
        provider: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Override a provider's endpoint; omit the URL to reset it.
    SetBaseUrl { provider: String, url: Option<String> },
    /// Language of new analyses: en or zh.
    Language { language: String },
}

#[derive(Subcommand, Debug)]
enum CloudCmd {
    /// Set the backend URL and anon key and enable sync.
    Configure {
        url: String,
        anon_key: String,
        #[arg(long)]
        disable: bool,
    },
    Login {
        email: String,
        #[arg(long, env = "PAPERLENS_CLOUD_PASSWORD")]
        password: String,
    },
    Signup {
        email: String,
        #[arg(long, env = "PAPERLENS_CLOUD_PASSWORD")]
        password: String,
    },
    Logout,
    Whoami,
    /// Merge the cloud copy into the local library.
    Sync,
    /// Print the SQL that prepares the backend.
    Schema,
    /// Signed download URL for a document's stored PDF.
    Url { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Command::Cloud(CloudCmd::Schema) = cli.command {
        println!("{}", cloud::schema_sql());
        return Ok(());
    }
    if let Command::Extract { path, password } = &cli.command {
        return extract(path, password.clone()).await;
    }

    let db = match &cli.db {
        Some(p) => p.clone(),
        None => KvStore::default_path().context("Cannot determine the library location")?,
    };
    let library = Library::open_path(&db)
        .with_context(|| format!("Failed to open library at {}", db.display()))?;

    run(&cli, library, show_progress).await
}

async fn run(cli: &Cli, library: Library, show_progress: bool) -> Result<()> {
    match &cli.command {
        Command::Add { inputs, password } => {
            let extractor: Arc<dyn TextExtractor> = Arc::new(
                password
                    .clone()
                    .map(PdfiumExtractor::with_password)
                    .unwrap_or_default(),
            );
            let ingestor = ingestor(cli, &library, show_progress)?.with_extractor(extractor);
            let (urls, paths): (Vec<&String>, Vec<&String>) =
                inputs.iter().partition(|i| input::is_url(i));

            let mut outcomes = Vec::new();
            if !paths.is_empty() {
                let paths: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
                outcomes.extend(ingestor.ingest_files(&paths).await.context("Ingest failed")?);
            }
            for url in urls {
                outcomes.push(ingestor.ingest_url(url).await.context("URL analysis failed")?);
            }
            report(cli, &outcomes, show_progress);
            if outcomes.iter().all(|o| !o.is_complete()) {
                bail!("no paper was analysed");
            }
        }
        Command::AddUrl { url } => {
            let outcome = ingestor(cli, &library, show_progress)?
                .ingest_url(url)
                .await
                .context("URL analysis failed")?;
            report(cli, std::slice::from_ref(&outcome), show_progress);
            if let Some(e) = outcome.error {
                bail!(e);
            }
        }
        Command::List {
            favorites,
            collection,
            tag,
            json,
        } => {
            let filter = if *favorites {
                Filter::Favorites
            } else if let Some(c) = collection {
                Filter::Collection(resolve_collection(&library, c)?)
            } else if let Some(t) = tag {
                Filter::Tag(t.clone())
            } else {
                Filter::All
            };
            let docs = library.update(|s| {
                s.set_filter(filter);
                s.filtered_documents().into_iter().map(without_payload).collect::<Vec<_>>()
            })?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&docs)?);
            } else {
                print_list(&docs);
            }
        }
        Command::Show { id, json } => {
            let id = resolve_document(&library, id)?;
            let doc = library.update(|s| {
                s.open_document(&id);
                s.mark_read(&id)
            })?;
            let doc = doc.context("document disappeared")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&without_payload(&doc))?);
            } else {
                let names = library.read(|s| {
                    doc.collection_ids
                        .iter()
                        .filter_map(|c| s.collection(c).map(|c| c.name.clone()))
                        .collect::<Vec<_>>()
                });
                print_document(&doc, &names);
            }
            library.update(|s| s.close_reader())?;
        }
        Command::Tag { id, tag, remove } => {
            let id = resolve_document(&library, id)?;
            let doc = if *remove {
                library.remove_tag(&id, tag).await?
            } else {
                library.add_tag(&id, tag).await?
            };
            if let Some(doc) = doc {
                println!("{}  {}", short(&doc.id), doc.tags.join(", "));
            }
            warn_cloud(&library);
        }
        Command::Note { id, text } => {
            let id = resolve_document(&library, id)?;
            library.set_notes(&id, text).await?;
            warn_cloud(&library);
        }
        Command::Fav { id } => {
            let id = resolve_document(&library, id)?;
            if let Some(doc) = library.toggle_favorite(&id).await? {
                println!(
                    "{} {}",
                    if doc.is_favorite { "★" } else { "☆" },
                    doc.display_title()
                );
            }
            warn_cloud(&library);
        }
        Command::Delete { id } => {
            let id = resolve_document(&library, id)?;
            if let Some(doc) = library.delete_document(&id).await? {
                println!("Deleted {}", doc.display_title());
            }
            warn_cloud(&library);
        }
        Command::Collection(cmd) => collection(&library, cmd)?,
        Command::Config(cmd) => config(&library, cmd)?,
        Command::Models { provider } => {
            let providers = match provider {
                Some(p) => vec![p.parse::<Provider>()?],
                None => Provider::ALL.to_vec(),
            };
            for p in providers {
                let dialect = if p.is_schema_enforced() {
                    "schema-enforced"
                } else {
                    "prompted JSON"
                };
                println!(
                    "{}  {}",
                    bold(p.id()),
                    dim(&format!("{dialect}, {} chars", p.max_chars()))
                );
                for m in p.models() {
                    println!("  {:<44} {}", m.id, dim(m.name));
                }
            }
        }
        Command::Cloud(cmd) => cloud_cmd(&library, cmd).await?,
        Command::Chat { id, question } => {
            let id = resolve_document(&library, id)?;
            let doc = library.document(&id).context("document disappeared")?;
            if doc.status != DocumentStatus::Complete {
                bail!("'{}' has no analysis yet ({})", doc.display_title(), doc.status);
            }
            let mut chat = ChatSession::new(&doc, &effective_ai_config(cli, &library)?)?;
            match question {
                Some(q) => ask(&mut chat, q).await?,
                None => {
                    let stdin = io::stdin();
                    eprint!("{} ", cyan("?"));
                    for line in stdin.lock().lines() {
                        let line = line.context("Failed to read question")?;
                        if !line.trim().is_empty() {
                            ask(&mut chat, line.trim()).await?;
                        }
                        eprint!("{} ", cyan("?"));
                    }
                }
            }
        }
        Command::Export { path } => {
            library.export_to(path).context("Export failed")?;
            if !cli.quiet {
                eprintln!("{} exported to {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        Command::Import { path } => {
            library.import_from(path).context("Import failed")?;
            let n = library.read(|s| s.documents.len());
            if !cli.quiet {
                eprintln!("{} imported; library holds {} document(s)", green("✔"), n);
            }
        }
        Command::Extract { .. } | Command::Cloud(CloudCmd::Schema) => {
            unreachable!("handled before opening the library")
        }
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Stored AI settings with per-run overrides and environment keys applied.
fn effective_ai_config(cli: &Cli, library: &Library) -> Result<AiConfig> {
    let mut config = library.ai_config();
    if let Some(p) = &cli.provider {
        let provider: Provider = p.parse()?;
        if provider != config.active_provider {
            config.active_provider = provider;
            config.active_model = provider.default_model().to_string();
        }
    }
    if let Some(m) = &cli.model {
        config.active_model = m.clone();
    }
    config.apply_env_keys();
    Ok(config)
}

fn ingestor(cli: &Cli, library: &Library, show_progress: bool) -> Result<Ingestor> {
    let mut ingestor =
        Ingestor::new(library.clone()).with_ai_config(effective_ai_config(cli, library)?);
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        ingestor = ingestor.with_progress(cb);
    }
    Ok(ingestor)
}

fn report(cli: &Cli, outcomes: &[IngestOutcome], show_progress: bool) {
    if !cli.quiet && !show_progress {
        for o in outcomes {
            match &o.error {
                None => eprintln!("{} {}  {}", green("✓"), short(&o.id), o.name),
                Some(e) => eprintln!("{} {}  {}: {}", red("✗"), short(&o.id), o.name, e),
            }
        }
    }
}

fn warn_cloud(library: &Library) {
    if let Some(e) = library.last_cloud_error() {
        eprintln!("{} {}", cyan("⚠"), e);
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Copy without the cached PDF bytes, for printing.
fn without_payload(doc: &Document) -> Document {
    let mut d = doc.clone();
    d.file_data = None;
    d
}

fn resolve_document(library: &Library, prefix: &str) -> Result<String> {
    let matches: Vec<String> = library.read(|s| {
        s.documents
            .iter()
            .filter(|d| d.id.starts_with(prefix))
            .map(|d| d.id.clone())
            .collect()
    });
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => bail!("no document matches '{prefix}'"),
        _ => bail!("'{prefix}' matches {} documents; use a longer prefix", matches.len()),
    }
}

fn resolve_collection(library: &Library, prefix: &str) -> Result<String> {
    let matches: Vec<String> = library.read(|s| {
        s.collections
            .iter()
            .filter(|c| c.id.starts_with(prefix) || c.name == prefix)
            .map(|c| c.id.clone())
            .collect()
    });
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => bail!("no collection matches '{prefix}'"),
        _ => bail!("'{prefix}' matches {} collections", matches.len()),
    }
}

fn status_badge(status: DocumentStatus) -> String {
    match status {
        DocumentStatus::Complete => green(status.label()),
        DocumentStatus::Error => red(status.label()),
        s if s.is_in_flight() => cyan(s.label()),
        s => dim(s.label()),
    }
}

fn print_list(docs: &[Document]) {
    if docs.is_empty() {
        eprintln!("{}", dim("No documents."));
        return;
    }
    for d in docs {
        println!(
            "{} {} {:<10} {}{}  {}",
            short(&d.id),
            if d.is_favorite { "★" } else { " " },
            status_badge(d.status),
            if d.is_read { String::new() } else { bold("• ") },
            d.display_title(),
            dim(&d.tags.join(", ")),
        );
    }
}

fn print_document(doc: &Document, collections: &[String]) {
    println!("{}", bold(doc.display_title()));
    if let Some(a) = &doc.analysis {
        if !a.authors.is_empty() {
            println!("{}", dim(&a.authors.join(", ")));
        }
    }
    println!(
        "{}  {}  added {}",
        short(&doc.id),
        status_badge(doc.status),
        doc.date_added.format("%Y-%m-%d %H:%M")
    );
    if let Some(url) = &doc.source_url {
        println!("source: {url}");
    }
    if !doc.tags.is_empty() {
        println!("tags: {}", doc.tags.join(", "));
    }
    if !collections.is_empty() {
        println!("collections: {}", collections.join(", "));
    }
    if let Some(e) = &doc.error_message {
        println!("{} {}", red("error:"), e);
    }
    if let Some(a) = &doc.analysis {
        for (label, body) in a.sections() {
            println!("\n{}\n{}", cyan(&format!("## {label}")), body);
        }
    }
    if !doc.user_notes.trim().is_empty() {
        println!("\n{}\n{}", cyan("## Notes"), doc.user_notes);
    }
}

async fn ask(chat: &mut ChatSession, question: &str) -> Result<()> {
    let mut out = io::stdout();
    chat.ask_with(question, |chunk| {
        let _ = out.write_all(chunk.as_bytes());
        let _ = out.flush();
    })
    .await
    .context("Chat request failed")?;
    println!();
    Ok(())
}

async fn extract(path: &std::path::Path, password: Option<String>) -> Result<()> {
    let pdf = input::read_local(path).await?;
    let extractor = password.map(PdfiumExtractor::with_password).unwrap_or_default();
    let text = extractor
        .extract(&pdf.name, &pdf.bytes)
        .await
        .context("Extraction failed")?;
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes()).context("Failed to write to stdout")?;
    Ok(())
}

fn collection(library: &Library, cmd: &CollectionCmd) -> Result<()> {
    match cmd {
        CollectionCmd::List => {
            let rows = library.read(|s| {
                s.collections
                    .iter()
                    .map(|c| {
                        let n = s.documents.iter().filter(|d| d.in_collection(&c.id)).count();
                        (c.id.clone(), c.name.clone(), n)
                    })
                    .collect::<Vec<_>>()
            });
            for (id, name, n) in rows {
                println!("{}  {:<30} {}", short(&id), name, dim(&format!("{n} paper(s)")));
            }
        }
        CollectionCmd::Create { name } => {
            let c = library.update(|s| s.create_collection(name.clone()))?;
            println!("{}  {}", short(&c.id), c.name);
        }
        CollectionCmd::Rename { id, name } => {
            let id = resolve_collection(library, id)?;
            library.update(|s| s.rename_collection(&id, name.clone()))??;
        }
        CollectionCmd::Delete { id } => {
            let id = resolve_collection(library, id)?;
            library.update(|s| s.delete_collection(&id))?;
        }
        CollectionCmd::Add { collection, document } => {
            let cid = resolve_collection(library, collection)?;
            let did = resolve_document(library, document)?;
            library.update(|s| s.add_to_collection(&did, &cid))??;
        }
        CollectionCmd::Remove { collection, document } => {
            let cid = resolve_collection(library, collection)?;
            let did = resolve_document(library, document)?;
            library.update(|s| s.remove_from_collection(&did, &cid))?;
        }
    }
    Ok(())
}

fn config(library: &Library, cmd: &ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Show => {
            let (ai, cloud, lang) = library.read(|s| {
                (
                    s.ai_config.clone(),
                    s.cloud_config.clone(),
                    s.analysis_language,
                )
            });
            println!("provider:  {}", bold(ai.active_provider.id()));
            println!("model:     {}", ai.active_model);
            println!("language:  {:?}", lang);
            for p in Provider::ALL {
                let key = if ai.key(p).is_some() { green("set") } else { dim("—") };
                println!("  {:<12} key {}  {}", p.id(), key, dim(&ai.base_url(p)));
            }
            println!(
                "cloud:     {}{}",
                if cloud.is_active() { green("enabled") } else { dim("disabled") },
                cloud
                    .last_sync
                    .map(|t| format!("  last sync {}", t.format("%Y-%m-%d %H:%M")))
                    .unwrap_or_default()
            );
        }
        ConfigCmd::SetKey { provider, key } => {
            let p: Provider = provider.parse()?;
            library.update(|s| s.set_api_key(p, key.clone()))?;
        }
        ConfigCmd::SetProvider { provider, model } => {
            let p: Provider = provider.parse()?;
            let mut builder = AiConfig::builder().provider(p);
            if let Some(m) = model {
                builder = builder.model(m.clone());
            }
            let fresh = builder.build().context("Invalid configuration")?;
            library.update(|s| {
                let mut config = s.ai_config.clone();
                config.active_provider = fresh.active_provider;
                config.active_model = fresh.active_model;
                s.set_ai_config(config);
            })?;
        }
        ConfigCmd::SetBaseUrl { provider, url } => {
            let p: Provider = provider.parse()?;
            if let Some(u) = url {
                AiConfig::builder()
                    .base_url(p, u.clone())
                    .build()
                    .context("Invalid base URL")?;
            }
            library.update(|s| s.set_base_url(p, url.clone()))?;
        }
        ConfigCmd::Language { language } => {
            let lang: Language = language.parse().map_err(anyhow::Error::msg)?;
            library.update(|s| s.set_analysis_language(lang))?;
        }
    }
    Ok(())
}

async fn cloud_cmd(library: &Library, cmd: &CloudCmd) -> Result<()> {
    if let CloudCmd::Configure { url, anon_key, disable } = cmd {
        let last_sync = library.read(|s| s.cloud_config.last_sync);
        library.set_cloud_config(CloudConfig {
            url: url.clone(),
            anon_key: anon_key.clone(),
            enabled: !disable,
            last_sync,
        })?;
        return Ok(());
    }

    let client = library
        .cloud()
        .context("Cloud sync is not configured; run `paperlens cloud configure <URL> <ANON_KEY>`")?;
    match cmd {
        CloudCmd::Login { email, password } => {
            let session = client.sign_in(email, password).await?;
            println!(
                "{} signed in as {}",
                green("✔"),
                session.user.email.as_deref().unwrap_or(email)
            );
        }
        CloudCmd::Signup { email, password } => match client.sign_up(email, password).await? {
            Some(_) => println!("{} account created and signed in", green("✔")),
            None => println!("{} account created; confirm the e-mail, then log in", cyan("◆")),
        },
        CloudCmd::Logout => {
            client.sign_out().await?;
            println!("signed out");
        }
        CloudCmd::Whoami => {
            let user = client.current_user().await?;
            println!("{}  {}", user.id, user.email.unwrap_or_default());
        }
        CloudCmd::Sync => {
            let n = library.refresh_from_cloud().await?;
            println!("{} {} document(s) from cloud", green("✔"), n);
        }
        CloudCmd::Url { id } => {
            let id = resolve_document(library, id)?;
            let path = library
                .document(&id)
                .and_then(|d| d.storage_path)
                .context("document has no stored PDF")?;
            println!("{}", client.signed_url(&path).await?);
        }
        CloudCmd::Configure { .. } | CloudCmd::Schema => {}
    }
    Ok(())
}
