//! drivepad 命令行入口

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use drivepad_lib::commands::{self, drive_cmd, session_cmd, HOME_STATE_KEY};
use drivepad_lib::config::{self, expand_tilde};
use drivepad_lib::models::Metadata;
use drivepad_lib::session::SavedStateStore;
use drivepad_lib::{foreground, logger, server, TracingPresenter};

#[derive(Parser)]
#[command(name = "drivepad")]
#[command(version, about = "Edit text files on a remote drive", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.drivepad/config.yaml)
    #[arg(short, long, global = true, env = "DRIVEPAD_CONFIG")]
    config: Option<String>,

    /// Account to connect with; overrides the saved account
    #[arg(short, long, global = true, env = "DRIVEPAD_ACCOUNT")]
    account: Option<String>,

    /// Forget the saved account before connecting
    #[arg(long, global = true)]
    forget_account: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List text files in the root folder
    List,
    /// Request a sync, then list text files
    Sync,
    /// Create an empty text file in the root folder
    CreateFile,
    /// Create a starred test folder in the root folder
    CreateFolder,
    /// Print the contents of a file
    Cat {
        /// Resource id
        id: String,
    },
    /// Change the title and/or contents of a file
    Edit {
        /// Resource id
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        text: Option<String>,
    },
    /// Serve the in-memory drive over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
    },
}

fn print_listing(files: &[Metadata]) {
    for file in files {
        let star = if file.starred { "*" } else { " " };
        println!(
            "{} {:<34} {:<28} {}",
            star,
            file.resource.id,
            file.title,
            file.modified_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("{} file(s)", files.len());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => expand_tilde(path),
        None => config::default_config_path()?,
    };
    let config = config::load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    logger::init(&config.logging, cli.verbose);

    if let Commands::Serve { bind } = cli.command {
        let drive = commands::demo_drive(&config);
        server::serve(bind, drive)
            .await
            .with_context(|| format!("serving on {}", bind))?;
        return Ok(());
    }

    let store = match SavedStateStore::new() {
        Ok(store) => Some(store),
        Err(e) => {
            tracing::warn!("[Main] 无法使用状态目录: {}", e);
            None
        }
    };
    if cli.forget_account {
        if let Some(store) = &store {
            store.clear(HOME_STATE_KEY)?;
        }
    }

    let (ctx, fg) = foreground();
    let fg_task = tokio::spawn(fg.run());
    let service = commands::build_service(&config);
    let state = session_cmd::bootstrap(
        config,
        cli.account.clone(),
        store,
        service,
        ctx,
        Arc::new(TracingPresenter::default()),
    );

    let result = run(&state, cli.command).await;
    session_cmd::shutdown(&state).await;
    if let Err(e) = fg_task.await {
        tracing::debug!("[Main] 前台任务异常结束: {}", e);
    }
    result.map_err(anyhow::Error::msg)
}

async fn run(state: &commands::AppState, command: Commands) -> Result<(), String> {
    session_cmd::connect(state).await?;
    match command {
        Commands::List => print_listing(&drive_cmd::list_files(state).await?),
        Commands::Sync => print_listing(&drive_cmd::sync(state).await?),
        Commands::CreateFile => {
            let handle = drive_cmd::create_file(state).await?;
            println!("created {}", handle.id);
        }
        Commands::CreateFolder => {
            let handle = drive_cmd::create_folder(state).await?;
            println!("created {}", handle.id);
        }
        Commands::Cat { id } => {
            let contents = drive_cmd::cat(state, &id).await?;
            print!("{}", contents.text);
            if contents.truncated {
                eprintln!("[truncated after {} lines]", contents.lines);
            }
        }
        Commands::Edit { id, title, text } => {
            let summary = drive_cmd::edit(state, &id, title, text).await?;
            match summary.bytes_written {
                Some(bytes) => println!("saved {} byte(s) to {}", bytes, summary.resource.id),
                None => println!("contents of {} unchanged", summary.resource.id),
            }
            if summary.title_updated {
                println!("title updated");
            }
        }
        Commands::Serve { .. } => return Err("serve does not use a session".to_string()),
    }
    Ok(())
}
