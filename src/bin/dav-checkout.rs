//
//  Command line front end.
//
//  dav-checkout -u alice checkout <url>
//      locks and downloads the document, then prints the local path and
//      the lock token on two lines.
//  dav-checkout -u alice checkin <url> <path> <token>
//      uploads the local file, unlocks the document and removes the file.
//

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use dav_checkout::{
    cancellation, CheckinError, CheckoutSession, Coordinator, Credentials, DavError, DocumentRef,
    HttpConfig, LockToken, Severity,
};

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// login, also used as the lock owner
    #[arg(short, long, env = "DAV_USER")]
    user: String,
    /// password for basic authentication
    #[arg(short, long, env = "DAV_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,
    /// directory to create working directories in
    #[arg(short, long)]
    temp_dir: Option<PathBuf>,
    /// lock timeout in seconds
    #[arg(short, long, default_value = "600")]
    lock_timeout: u64,
    /// pooled connections per host
    #[arg(long, default_value = "20")]
    max_connections: usize,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// lock and download a document
    Checkout { url: String },
    /// upload a document, unlock it and remove the local copy
    Checkin {
        url: String,
        path: PathBuf,
        token: String,
    },
    /// release a lock without uploading anything
    Unlock { url: String, token: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let transport = HttpConfig::new()
        .credentials(Credentials::new(&cli.user, &cli.password))
        .max_connections_per_host(cli.max_connections)
        .build();
    let mut config = Coordinator::builder(Arc::new(transport))
        .lock_timeout(Duration::from_secs(cli.lock_timeout));
    if let Some(dir) = &cli.temp_dir {
        config = config.temp_root(dir);
    }
    let coordinator = config.build();

    match run(&coordinator, &cli.user, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}

async fn run(coordinator: &Coordinator, user: &str, command: Command) -> Result<(), ExitCode> {
    match command {
        Command::Checkout { url } => {
            let doc = parse(&url)?;
            let (handle, cancel) = cancellation();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    handle.cancel();
                }
            });
            match coordinator.checkout(doc, user, &cancel).await {
                Ok(session) => {
                    if let (Some(wc), Some(token)) = (session.working_copy(), session.lock_token()) {
                        println!("{}", wc.file().display());
                        println!("{token}");
                    }
                    Ok(())
                }
                Err(DavError::Cancelled) => {
                    eprintln!("download cancelled, document unlocked");
                    Err(ExitCode::from(130))
                }
                Err(e) => fail(e),
            }
        }
        Command::Checkin { url, path, token } => {
            let doc = parse(&url)?;
            let session = CheckoutSession::resume(doc, path, LockToken::new(token)).or_else(fail)?;
            match coordinator.checkin(session).await {
                Ok(()) => Ok(()),
                Err(e @ CheckinError::NotReleased { .. }) => {
                    eprintln!("warning: {e}");
                    Err(ExitCode::from(2))
                }
                Err(e) => {
                    debug_assert_eq!(e.severity(), Severity::DataAtRisk);
                    eprintln!("error: {e}");
                    Err(ExitCode::FAILURE)
                }
            }
        }
        Command::Unlock { url, token } => {
            let doc = parse(&url)?;
            let mut session = CheckoutSession::locked(doc, LockToken::new(token));
            coordinator.unlock(&mut session).await.or_else(fail)
        }
    }
}

fn parse(url: &str) -> Result<DocumentRef, ExitCode> {
    DocumentRef::parse(url).or_else(fail)
}

fn fail<T>(e: DavError) -> Result<T, ExitCode> {
    eprintln!("error: {e}");
    Err(ExitCode::FAILURE)
}
