use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use directories::ProjectDirs;
use folio_application::{DocumentLibrary, ImportFile, MemoryStore};
use folio_core::{DocumentStore, Settings};
use folio_engine::{Engine, generate_thumbnail};
use folio_storage::Storage;
use folio_ui::Ui;
use log::{LevelFilter, info, warn};
use simplelog::{Config, WriteLogger};

/// Terminal reader for PDF, EPUB and CBZ documents.
#[derive(Debug, Parser)]
#[command(name = "folio", version)]
struct Cli {
    /// Import these files into the library before starting.
    #[arg(long, value_name = "FILE", num_args = 1..)]
    import: Vec<PathBuf>,

    /// Library database (defaults to the config dir).
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Log level written to folio.log. Overrides FOLIO_LOG.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Import and exit without starting the reader.
    #[arg(long)]
    no_ui: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_dirs = ProjectDirs::from("dev", "folio", "folio").context("resolve project dirs")?;
    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir)
        .with_context(|| format!("create config dir {}", config_dir.display()))?;

    init_logging(config_dir, cli.log_level.as_deref())?;
    info!("starting folio {}", env!("CARGO_PKG_VERSION"));

    let db_path = cli.db.clone().unwrap_or_else(|| config_dir.join("folio.db"));
    let (settings_store, store) = open_stores(&db_path);
    let settings = load_settings(settings_store.as_ref());

    let engine = Engine::new();
    if let Err(err) = engine.check_pdfium() {
        warn!("pdf rendering unavailable: {err}");
    }

    let mut library = DocumentLibrary::load(store);
    import_files(&mut library, &engine, &settings, &cli.import);
    if cli.no_ui {
        return Ok(());
    }

    let mut ui = Ui::new(library, settings, engine);
    let outcome = ui.run()?;
    save_settings(settings_store.as_ref(), &outcome.settings);
    info!("bye");
    Ok(())
}

fn init_logging(config_dir: &Path, level: Option<&str>) -> anyhow::Result<()> {
    let level = level
        .map(str::to_string)
        .or_else(|| std::env::var("FOLIO_LOG").ok())
        .and_then(|level| level.trim().parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    let log_path = config_dir.join("folio.log");
    let file = fs::File::create(&log_path)
        .with_context(|| format!("create log file {}", log_path.display()))?;
    WriteLogger::init(level, Config::default(), file).context("init logger")?;
    Ok(())
}

/// Opens the settings connection and the document store. A database that
/// cannot be opened leaves the library in memory for this run.
fn open_stores(db_path: &Path) -> (Option<Storage>, Box<dyn DocumentStore>) {
    let settings = Storage::open(db_path);
    let documents = Storage::open(db_path);
    match (settings, documents) {
        (Ok(settings), Ok(documents)) => {
            let store: Box<dyn DocumentStore> = Box::new(documents);
            (Some(settings), store)
        }
        (Err(err), _) | (_, Err(err)) => {
            warn!("library database unavailable, changes will not be saved: {err:#}");
            let store: Box<dyn DocumentStore> = Box::new(MemoryStore::new());
            (None, store)
        }
    }
}

/// Stored settings, or the defaults when they cannot be read.
fn load_settings(storage: Option<&Storage>) -> Settings {
    let Some(storage) = storage else {
        return Settings::default();
    };
    match storage.load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            warn!("failed to load settings, using defaults: {err:#}");
            Settings::default()
        }
    }
}

fn save_settings(storage: Option<&Storage>, settings: &Settings) {
    let Some(storage) = storage else {
        return;
    };
    if let Err(err) = storage.save_settings(settings) {
        warn!("failed to save settings: {err:#}");
    }
}

fn import_files(library: &mut DocumentLibrary, engine: &Engine, settings: &Settings, paths: &[PathBuf]) {
    if paths.is_empty() {
        return;
    }
    let files: Vec<ImportFile> = paths
        .iter()
        .filter_map(|path| match ImportFile::read(path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!("skipping {}: {err:#}", path.display());
                warn!("skipping {}: {err:#}", path.display());
                None
            }
        })
        .collect();

    let quality = settings.thumbnail_quality;
    let ids = library.import_files(files, |format, bytes| {
        generate_thumbnail(engine, format, bytes, quality)
    });
    eprintln!("imported {} document(s)", ids.len());
}
