use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_notary::bridge::{BridgeMode, WalletBridge};
use pdf_notary::config::NotaryConfig;
use pdf_notary::core::PDFDocument;
use pdf_notary::intake::{SelectedFile, format_file_size};
use pdf_notary::present::{JsonPresenter, Presenter, ResultPanel, TextPresenter};
use pdf_notary::session::Session;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "pdf-notary", version, about = "Preview a PDF, hash it, and record or sign the digest with a wallet")]
struct Cli {
    /// Config file (defaults to <config_dir>/pdf-notary/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    /// One JSON object per line on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Wallet JSON-RPC endpoint
    #[arg(long, global = true, env = "PDF_NOTARY_RPC_URL")]
    rpc_url: Option<String>,

    /// Hex private key for the local development signer
    #[arg(long, global = true, env = "PDF_NOTARY_DEV_KEY", hide_env_values = true)]
    dev_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show version, metadata and page sizes
    Inspect { file: PathBuf },

    /// Render one page, optionally to a PNG file
    Preview {
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        scale: Option<f64>,
    },

    /// Print the SHA-256 digest without touching the wallet
    Hash { file: PathBuf },

    /// Hash the file and record or sign the digest
    Validate {
        file: PathBuf,
        /// transact or sign (defaults to the configured mode)
        #[arg(long)]
        mode: Option<BridgeMode>,
    },

    /// Hash the file and sign the digest
    Sign { file: PathBuf },

    /// Request wallet access and print the account
    Connect,

    /// Interactive session
    Browse { file: Option<PathBuf> },
}

fn exit_code(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn build_session(config: &NotaryConfig) -> Result<Session> {
    let provider = config
        .build_provider()
        .context("failed to set up the wallet provider")?;
    if provider.is_none() {
        tracing::debug!("no wallet provider configured");
    }
    let bridge = Arc::new(WalletBridge::new(provider));
    Ok(Session::new(config.session_options(), bridge))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    pdf_notary::logging::init(cli.verbose)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("failed to initialize logging")?;

    let mut config = NotaryConfig::load(cli.config.as_deref())?;
    if cli.rpc_url.is_some() {
        config.wallet.rpc_url = cli.rpc_url.clone();
    }
    if cli.dev_key.is_some() {
        config.wallet.dev_private_key = cli.dev_key.clone();
    }

    let mut presenter: Box<dyn Presenter> = if cli.json {
        Box::new(JsonPresenter::new(std::io::stdout()))
    } else {
        Box::new(TextPresenter::new(std::io::stdout()))
    };
    let presenter = presenter.as_mut();

    match cli.command {
        Command::Inspect { file } => inspect(&file, &config, cli.json).await,
        Command::Preview {
            file,
            page,
            out,
            scale,
        } => {
            if let Some(scale) = scale {
                config.preview.scale = scale;
            }
            preview(&file, page, out.as_deref(), &config, presenter).await
        }
        Command::Hash { file } => {
            match SelectedFile::open(&file, config.intake.max_file_size).await {
                Ok(selected) => {
                    presenter.show_file(selected.descriptor());
                    presenter.show_digest(&pdf_notary::DigestHex::compute(selected.bytes()));
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    presenter.present(&ResultPanel::error(e.to_string()));
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Validate { file, mode } => {
            if let Some(mode) = mode {
                config.wallet.mode = mode;
            }
            validate(&file, &config, presenter).await
        }
        Command::Sign { file } => {
            config.wallet.mode = BridgeMode::Sign;
            validate(&file, &config, presenter).await
        }
        Command::Connect => {
            let mut session = build_session(&config)?;
            Ok(exit_code(session.connect(presenter).await.is_ok()))
        }
        Command::Browse { file } => browse(file, &config, presenter).await,
    }
}

async fn inspect(file: &Path, config: &NotaryConfig, as_json: bool) -> Result<ExitCode> {
    let selected = SelectedFile::open(file, config.intake.max_file_size).await?;
    let mut document = PDFDocument::open(selected.shared_bytes())
        .with_context(|| format!("failed to decode {}", file.display()))?;
    let info = document.document_info().unwrap_or_default();
    let page_count = document.page_count().context("failed to read the page tree")?;

    let mut pages = Vec::new();
    for index in 0..page_count as usize {
        match document.get_page(index) {
            Ok(page) => {
                let (width, height) = page.size();
                pages.push(json!({
                    "page": index + 1,
                    "width": width,
                    "height": height,
                    "rotate": page.rotate(),
                }));
            }
            Err(e) => tracing::warn!(page = index + 1, error = %e, "page unreadable"),
        }
    }

    let digest = pdf_notary::DigestHex::compute(selected.bytes());
    let report = json!({
        "name": selected.name(),
        "size": selected.size(),
        "version": document.pdf_version(),
        "title": &info.title,
        "author": &info.author,
        "subject": &info.subject,
        "creator": &info.creator,
        "producer": &info.producer,
        "creation_date": &info.creation_date,
        "page_count": page_count,
        "pages": &pages,
        "digest": &digest,
    });

    if as_json {
        println!("{}", report);
        return Ok(ExitCode::SUCCESS);
    }

    println!("File:     {} ({})", selected.name(), format_file_size(selected.size()));
    println!("Version:  {}", document.pdf_version().as_deref().unwrap_or("unknown"));
    let fields = [
        ("Title", &info.title),
        ("Author", &info.author),
        ("Subject", &info.subject),
        ("Creator", &info.creator),
        ("Producer", &info.producer),
        ("Created", &info.creation_date),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{:<9} {}", format!("{}:", label), value);
        }
    }
    println!("Pages:    {}", page_count);
    for page in &pages {
        println!(
            "  {:>4}  {} x {} pt  rotate {}",
            page["page"], page["width"], page["height"], page["rotate"]
        );
    }
    println!("SHA-256:  {}", digest);
    Ok(ExitCode::SUCCESS)
}

async fn preview(
    file: &Path,
    page: u32,
    out: Option<&Path>,
    config: &NotaryConfig,
    presenter: &mut dyn Presenter,
) -> Result<ExitCode> {
    let mut session = build_session(config)?;
    if session.select_path(file, presenter).await.is_err() {
        return Ok(ExitCode::FAILURE);
    }

    let count = session.preview().map(|p| p.page_count()).unwrap_or(0);
    if page < 1 || page > count {
        presenter.present(&ResultPanel::error(format!(
            "Page {} is out of range (document has {} pages)",
            page, count
        )));
        return Ok(ExitCode::FAILURE);
    }
    if page != 1 && session.go_to_page(page, presenter).is_none() {
        return Ok(ExitCode::FAILURE);
    }

    let Some(out) = out else {
        return Ok(ExitCode::SUCCESS);
    };
    let image = match session.current_rendering() {
        Some(rendered) => rendered?,
        None => return Ok(ExitCode::FAILURE),
    };

    let png = image.to_png().context("failed to encode page")?;
    tokio::fs::write(out, png)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    presenter.show_notice(&format!("Wrote {}", out.display()));
    Ok(ExitCode::SUCCESS)
}

async fn validate(file: &Path, config: &NotaryConfig, presenter: &mut dyn Presenter) -> Result<ExitCode> {
    let mut session = build_session(config)?;
    if session.select_path(file, presenter).await.is_err() && session.file().is_none() {
        return Ok(ExitCode::FAILURE);
    }
    let panel = session.validate(presenter).await;
    Ok(exit_code(panel.is_success()))
}

const BROWSE_HELP: &str = "commands: open <path> | next | prev | page <n> | hash | validate | mode <transact|sign> | connect | remove | status | help | quit";

async fn browse(file: Option<PathBuf>, config: &NotaryConfig, presenter: &mut dyn Presenter) -> Result<ExitCode> {
    let mut session = build_session(config)?;
    session.probe_wallet().await;
    if let Some(file) = file {
        let _ = session.select_path(&file, presenter).await;
    }

    let mut stderr = tokio::io::stderr();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stderr.write_all(b"> ").await?;
        stderr.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "open" if !argument.is_empty() => {
                let _ = session.select_path(argument, presenter).await;
            }
            "next" => {
                session.next_page(presenter);
            }
            "prev" | "previous" => {
                session.previous_page(presenter);
            }
            "page" => match argument.parse::<u32>() {
                Ok(page) => {
                    session.go_to_page(page, presenter);
                }
                Err(_) => presenter.show_notice("usage: page <n>"),
            },
            "hash" => match session.digest() {
                Some(digest) => presenter.show_digest(&digest),
                None => presenter.show_notice("Please select a PDF file first."),
            },
            "validate" => {
                session.validate(presenter).await;
            }
            "mode" => match argument.parse::<BridgeMode>() {
                Ok(mode) => {
                    session.set_mode(mode);
                    presenter.show_notice(&format!("Mode: {:?}", mode).to_lowercase());
                }
                Err(e) => presenter.show_notice(&e),
            },
            "connect" => {
                let _ = session.connect(presenter).await;
            }
            "remove" => {
                session.remove_file();
                presenter.show_notice("File removed.");
            }
            "status" => {
                let status = match (session.file(), session.preview()) {
                    (None, _) => "No file selected.".to_string(),
                    (Some(file), Some(preview)) => format!(
                        "{} ({}), page {} of {}",
                        file.name(),
                        format_file_size(file.size()),
                        preview.current_page(),
                        preview.page_count()
                    ),
                    (Some(file), None) => format!("{} ({}), no preview", file.name(), format_file_size(file.size())),
                };
                presenter.show_notice(&status);
            }
            "help" | "?" => presenter.show_notice(BROWSE_HELP),
            "quit" | "exit" => break,
            _ => presenter.show_notice(BROWSE_HELP),
        }
    }
    Ok(ExitCode::SUCCESS)
}
