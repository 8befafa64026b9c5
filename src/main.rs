mod print;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{Report, Result, miette};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tabula_cache::Outcome;
use tabula_library::{Host, Workbench};
use tabula_storage::backend::HttpBackend;
use tabula_storage::{RemoteItem, Session, Token};
use tabula_table::{Column, Sort};
use tabula_upload::{Status, UploadFile, ValidationError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabula", version, about = "Browse, upload and preprocess tabular datasets")]
struct Cli {
    /// Configuration file (defaults to config.{toml,yaml,json} in the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Bearer token, overriding `auth.token`
    #[arg(long, global = true, value_name = "TOKEN")]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List stored datasets
    List {
        /// Only show items whose name contains this text (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, value_enum)]
        sort: Option<Field>,
        /// Sort descending instead of ascending
        #[arg(long, requires = "sort")]
        desc: bool,
        /// Page to show, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Columns to leave out
        #[arg(long, value_enum)]
        hide: Vec<Field>,
    },
    /// Validate and upload files, one after another
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    Delete {
        key: String,
    },
    /// Profile a dataset: column types, missing values and summary statistics
    Analyse {
        key: String,
    },
    /// Show the first rows of a dataset
    Rows {
        key: String,
        #[arg(long, value_name = "COLUMN")]
        target: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Field {
    Name,
    Kind,
    Uploaded,
}

impl From<Field> for Column {
    fn from(field: Field) -> Self {
        match field {
            Field::Name => Column::Name,
            Field::Kind => Column::Kind,
            Field::Uploaded => Column::Uploaded,
        }
    }
}

/// Reports rejected files on stderr; every other notification is irrelevant
/// to a one-shot command.
struct Console;

impl Host for Console {
    fn on_upload_error(&self, file: &UploadFile, error: &ValidationError) {
        eprintln!("rejected {}: {error}", file.name);
    }
}

fn report(err: impl Debug) -> Report {
    miette!("{err:?}")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = tabula_config::load(cli.config.as_deref()).map_err(report)?;
    let token = cli.token.or_else(|| config.auth.token.clone());
    let backend = HttpBackend::new("http", &config.api.base_url, Some(config.api.timeout())).map_err(report)?;
    tracing::debug!(base_url = backend.base_url(), authenticated = token.is_some(), "Configured backend");

    let session = Session::new(token.map(Token::new));
    let mut workbench = Workbench::new(&config, Arc::new(backend), session, Arc::new(Console)).map_err(report)?;
    let result = run(&mut workbench, cli.command).await;
    workbench.teardown().await;
    result
}

async fn run(workbench: &mut Workbench, command: Command) -> Result<()> {
    match command {
        Command::List { filter, sort, desc, page, hide } => {
            load(workbench).await?;
            let table = workbench.table_mut();
            if let Some(filter) = filter {
                table.set_filter(filter);
            }
            if let Some(field) = sort {
                let column = Column::from(field);
                let sort = if desc { Sort::descending(column) } else { Sort::ascending(column) };
                table.set_sort(Some(sort)).map_err(report)?;
            }
            for field in hide {
                table.set_visible(field.into(), false).map_err(report)?;
            }
            table.set_page(page.saturating_sub(1));
            println!("{}", print::table(workbench.table()));
        },
        Command::Upload { files } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(UploadFile::from_path(path).await.map_err(report)?);
            }
            let pipeline = workbench.pipeline().clone();
            let batch = workbench.enqueue(uploads);
            if batch.is_empty() {
                return Err(miette!("no files accepted for upload"));
            }
            let ids = batch.ids().to_vec();
            let rejected = batch.rejected().len();
            if !batch.finished().await {
                return Err(miette!("upload interrupted"));
            }
            let queue = pipeline.queue();
            println!("{}", print::tasks(&queue, &ids));
            let failed = ids.iter().filter_map(|id| queue.get(*id)).filter(|task| task.status == Status::Error).count();
            if failed + rejected > 0 {
                return Err(miette!("{} of {} files not uploaded", failed + rejected, files.len()));
            }
        },
        Command::Delete { key } => {
            let item = find(workbench, &key).await?;
            workbench.delete(&item).await.map_err(report)?;
            println!("deleted {key}");
        },
        Command::Analyse { key } => {
            let item = find(workbench, &key).await?;
            let analysis = workbench.analyse(&item).await.map_err(report)?;
            println!("{}", print::report(&analysis));
        },
        Command::Rows { key, target } => {
            let item = find(workbench, &key).await?;
            let rows = workbench.preview(&item, target.as_deref()).await.map_err(report)?;
            println!("{}", print::rows(rows));
        },
    }
    Ok(())
}

async fn load(workbench: &mut Workbench) -> Result<()> {
    match workbench.refresh().await.map_err(report)? {
        Outcome::Skipped => Err(miette!(help = "pass --token or set TABULA_AUTH__TOKEN", "not signed in")),
        outcome => {
            tracing::debug!(?outcome, "Loaded items");
            Ok(())
        },
    }
}

async fn find(workbench: &mut Workbench, key: &str) -> Result<RemoteItem> {
    load(workbench).await?;
    workbench.item(key).map_err(report)
}
