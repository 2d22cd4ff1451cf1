//! spamc entry point.
//!
//! ```text
//! spamc check [FILE]                 Verdict and score
//! spamc report [--if-spam] [FILE]    Verdict plus the rule report
//! spamc learn <spam|ham|forget> [FILE]
//! spamc --gen-config                 Dump default config and exit
//! ```
//!
//! The message is read from FILE, or from stdin when FILE is omitted.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use spamc_core::{
    Client, Command, Headers, LearnType, Message, ReportResult, ResponseBody, TellResult,
};
use spamc_core::header::{MESSAGE_CLASS, REMOVE, SET};
use spamc_cli::config::SpamcConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "spamc", about = "Client for the spamd classification daemon")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "spamc.toml")]
    config: PathBuf,

    /// spamd address (overrides config). Example: 127.0.0.1:783
    #[arg(short, long)]
    address: Option<String>,

    /// Timeout for the whole call in milliseconds (overrides config).
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// `User` header to send (overrides config).
    #[arg(short, long)]
    user: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Check that spamd is alive.
    Ping,
    /// Print the verdict and score.
    Check { file: Option<PathBuf> },
    /// Print the verdict and the names of matching rules.
    Symbols { file: Option<PathBuf> },
    /// Print the verdict and the rule report.
    Report {
        /// Only return a report for spam.
        #[arg(long, conflicts_with = "ignore_warning")]
        if_spam: bool,
        /// Leave out rules that scored zero points.
        #[arg(long)]
        ignore_warning: bool,
        file: Option<PathBuf>,
    },
    /// Print the message as rewritten by spamd.
    Process { file: Option<PathBuf> },
    /// Print only the headers spamd rewrote.
    Headers { file: Option<PathBuf> },
    /// Train the message: spam, ham (notspam) or forget.
    Learn {
        learn_type: LearnType,
        file: Option<PathBuf>,
    },
    /// Send a raw TELL.
    Tell {
        /// Message-class: spam or ham.
        #[arg(long)]
        class: Option<String>,
        /// Databases to add the message to, e.g. `local,remote`.
        #[arg(long)]
        set: Option<String>,
        /// Databases to remove the message from.
        #[arg(long)]
        remove: Option<String>,
        file: Option<PathBuf>,
    },
    /// Learn as spam in the local and remote databases.
    ReportSpam { file: Option<PathBuf> },
    /// Learn as ham in the local and remote databases.
    RevokeSpam { file: Option<PathBuf> },
    /// Send any command by name and print what comes back.
    Raw {
        command: Command,
        file: Option<PathBuf>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&SpamcConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = SpamcConfig::load(&cli.config);
    if let Some(addr) = cli.address {
        config.network.address = addr;
    }
    if let Some(ms) = cli.timeout_ms {
        config.network.timeout_ms = ms;
    }
    if let Some(user) = cli.user {
        config.client.user = user;
    }

    // Init tracing. stdout carries command output.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("spamc v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = cli.command else {
        return Err("no command given; see --help".into());
    };

    let info = config.connection_info()?;
    let timeout = config.timeout();
    debug!(%info, ?timeout, "using spamd");

    let mut client = Client::connect_to(info, timeout);
    if let Some(user) = config.user() {
        client = client.with_default_user(user);
    }

    run(&client, command, timeout).await
}

async fn run(client: &Client, command: Cmd, timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let none = Headers::new();
    match command {
        Cmd::Ping => {
            let status = client.ping().await?;
            println!("{} {}", status.code, status.message);
        }
        Cmd::Check { file } => {
            let verdict = client.check(read_message(file).await?, &none).await?;
            println!("{verdict}");
        }
        Cmd::Symbols { file } => {
            let result = client.symbols(read_message(file).await?, &none).await?;
            println!("{}", result.verdict);
            println!("{}", result.symbols.join(","));
        }
        Cmd::Report {
            if_spam,
            ignore_warning,
            file,
        } => {
            let message = read_message(file).await?;
            let result = if if_spam {
                client.report_if_spam(message, &none).await?
            } else if ignore_warning {
                client.report_ignore_warning(message, &none).await?
            } else {
                client.report(message, &none).await?
            };
            print_report(&result);
        }
        Cmd::Process { file } => {
            let mut result = client.process(read_message(file).await?, &none).await?;
            eprintln!("{}", result.verdict);
            let mut stdout = tokio::io::stdout();
            tokio::time::timeout(timeout, tokio::io::copy(&mut result.body, &mut stdout)).await??;
            stdout.flush().await?;
            result.body.close();
        }
        Cmd::Headers { file } => {
            let mut result = client.headers(read_message(file).await?, &none).await?;
            eprintln!("{}", result.verdict);
            let text = result.body.read_to_string().await?;
            result.body.close();
            print!("{text}");
        }
        Cmd::Learn { learn_type, file } => {
            let result = client.learn(learn_type, read_message(file).await?, &none).await?;
            print_tell(&result);
        }
        Cmd::Tell {
            class,
            set,
            remove,
            file,
        } => {
            let mut headers = Headers::new();
            if let Some(class) = class {
                headers.try_set(MESSAGE_CLASS, class)?;
            }
            if let Some(set) = set {
                headers.try_set(SET, set)?;
            }
            if let Some(remove) = remove {
                headers.try_set(REMOVE, remove)?;
            }
            let result = client.tell(read_message(file).await?, &headers).await?;
            print_tell(&result);
        }
        Cmd::ReportSpam { file } => {
            let result = client.report_spam(read_message(file).await?, &none).await?;
            print_tell(&result);
        }
        Cmd::RevokeSpam { file } => {
            let result = client.revoke_spam(read_message(file).await?, &none).await?;
            print_tell(&result);
        }
        Cmd::Raw { command, file } => {
            let message = match command {
                Command::Ping | Command::Skip => Message::empty(),
                _ => read_message(file).await?,
            };
            let response = client.call(command, message, &none).await?;
            println!("SPAMD/{} {} {}", response.status.version, response.status.code, response.status.message);
            print!("{}", response.headers);
            match response.body {
                ResponseBody::None => {}
                ResponseBody::Verdict(verdict) => println!("{verdict}"),
                ResponseBody::Symbols(result) => println!("{}", result.symbols.join(",")),
                ResponseBody::Report(result) => print_report(&result),
                ResponseBody::Message(mut result) => {
                    let text = result.body.read_to_string().await?;
                    result.body.close();
                    print!("{text}");
                }
                ResponseBody::Tell(result) => print_tell(&result),
            }
        }
    }
    Ok(())
}

/// The message from `file`, or all of stdin.
async fn read_message(file: Option<PathBuf>) -> Result<Message, Box<dyn std::error::Error>> {
    match file {
        Some(path) => Ok(Message::open(path).await?),
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin().read_to_end(&mut buf).await?;
            Ok(Message::from(buf))
        }
    }
}

fn print_report(result: &ReportResult) {
    println!("{}", result.verdict);
    println!();
    print!("{}", result.report);
}

fn print_tell(result: &TellResult) {
    if !result.did_set.is_empty() {
        println!("DidSet: {}", result.did_set.join(","));
    }
    if !result.did_remove.is_empty() {
        println!("DidRemove: {}", result.did_remove.join(","));
    }
}
