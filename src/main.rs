//! harchiver CLI
//!
//! Captures browser network traffic into a HAR archive. Either launches a
//! local Chrome or connects to a running one over its remote debugging
//! endpoint; URLs come from arguments or stdin, and with no URLs at all the
//! tool listens until interrupted.

use anyhow::{bail, Context};
use clap::Parser;
use harchiver::browser::{validate_url, BrowserConfig, BrowserController};
use harchiver::capture::{self, CaptureOptions, Session};
use harchiver::har;
use std::fs::File;
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// Capture browser network traffic into HAR archives
#[derive(Parser, Debug)]
#[command(name = "harchiver")]
#[command(version)]
#[command(about = "Capture browser network traffic into HAR archives")]
struct Args {
    /// Chrome DevTools Protocol websocket endpoint (connect to a running browser)
    #[arg(long)]
    cdp: Option<String>,

    /// Path to a local Chrome installation to launch
    #[arg(long)]
    exe: Option<String>,

    /// Run a launched browser in headless mode
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    headless: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Navigation timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// URLs to capture, in order. With none given, URLs are read from stdin
    /// if piped; with no URLs at all, listen until interrupted.
    urls: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    // The archive may go to stdout; logs stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.cdp.is_none() && args.exe.is_none() {
        bail!("must specify --cdp, --exe, or both");
    }

    let urls = collect_urls(&args.urls)?;
    for url in &urls {
        validate_url(url)?;
    }

    let mut config = BrowserConfig::builder().headless(args.headless);
    if let Some(ref exe) = args.exe {
        config = config.chrome_path(exe.as_str());
    }
    let controller =
        BrowserController::connect_or_launch(args.cdp.as_deref(), config.build()).await?;

    let session = Session::new(controller.browser());
    session.start().await.context("session start")?;

    let result = if urls.is_empty() {
        info!("listening for network traffic, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        Ok(session.archive())
    } else {
        capture::run(
            &session,
            &CaptureOptions {
                urls,
                timeout: Duration::from_secs(args.timeout),
            },
        )
        .await
    };

    // A failed navigation still flushes whatever was captured before it
    let archive = match result {
        Ok(archive) => archive,
        Err(e) => {
            error!(error = %e, "capture failed, writing partial archive");
            session.archive()
        }
    };

    session.stop();
    drop(session);

    write_archive(&archive, args.output.as_deref())?;

    controller.close().await?;
    Ok(())
}

/// URLs from arguments, or newline-delimited stdin when piped.
///
/// Blank lines and `#` comments are skipped. An empty result means listen
/// mode, not an error.
fn collect_urls(args: &[String]) -> anyhow::Result<Vec<String>> {
    if !args.is_empty() {
        return Ok(args.to_vec());
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(Vec::new());
    }

    let mut urls = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        urls.push(line.to_string());
    }
    Ok(urls)
}

fn write_archive(archive: &har::Har, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("create output {}", path.display()))?;
            har::io::write(archive, file)?;
            info!(path = %path.display(), entries = archive.log.entries.len(), "archive written");
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            har::io::write(archive, &mut lock)?;
            lock.flush()?;
        }
    }
    Ok(())
}
