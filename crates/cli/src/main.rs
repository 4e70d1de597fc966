use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use teller_agents::{build_router, BankingRouter, BootstrapOptions, DEFAULT_ACCOUNT_ID};
use teller_core::format_money;
use teller_observability::init_tracing;
use teller_storage::Store;

#[derive(Debug, Parser)]
#[command(name = "teller")]
#[command(about = "Teller banking assistant CLI")]
struct Cli {
    #[arg(long, env = "TELLER_KB_ROOT", default_value = "kb")]
    kb_root: PathBuf,

    #[arg(long, env = "TELLER_ACCOUNT_ID", default_value = DEFAULT_ACCOUNT_ID)]
    account: String,

    /// SQLite url such as `sqlite://teller.db`; in-memory ledger when omitted.
    #[arg(long, env = "TELLER_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat,
    Ask {
        text: Vec<String>,
    },
    Balance,
    History,
    Transfer {
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: Decimal,
    },
    Kb {
        #[command(subcommand)]
        command: KbCommand,
    },
}

#[derive(Debug, Subcommand)]
enum KbCommand {
    Search {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("teller_cli");
    let cli = Cli::parse();

    let mut options = BootstrapOptions::from_env(&cli.kb_root);
    options.account_id = cli.account.clone();
    options.database_url = cli.database_url.clone();
    let router = build_router(&options).await?;

    match cli.command {
        Command::Chat => run_chat(&router, &cli.account).await?,
        Command::Ask { text } => {
            let text = text.join(" ");
            if text.trim().is_empty() {
                anyhow::bail!("ask needs a message, e.g. `teller ask send $20 to Maria`");
            }
            let envelope = router.handle(&cli.account, &text).await;
            print_json(&envelope)?;
        }
        Command::Balance => {
            let account = router
                .account(&cli.account)
                .await?
                .with_context(|| format!("account {} does not exist", cli.account))?;
            println!(
                "{}: {}{}",
                account.id,
                format_money(account.balance),
                if account.frozen { " (frozen)" } else { "" }
            );
        }
        Command::History => {
            let history = router.history(&cli.account).await?;
            print_json(&history)?;
        }
        Command::Transfer { to, amount } => {
            let envelope = router.transfer_funds(&cli.account, &to, amount).await;
            println!("{}", envelope.message);
            print_json(&envelope.side_effects)?;
        }
        Command::Kb { command } => match command {
            KbCommand::Search { query, limit } => {
                let hits = router.kb_search(&query, limit).await?;
                print_json(&hits)?;
            }
        },
    }

    Ok(())
}

async fn run_chat(router: &BankingRouter<Store>, account_id: &str) -> Result<()> {
    println!("Teller chat for account {account_id}. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let envelope = router.handle(account_id, message).await;
        println!("\n[{:?}] {}\n", envelope.status, envelope.message);
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
