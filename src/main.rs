use anyhow::Context;
use care_compare::cli::{self, ChatArgs, LookupArgs};
use care_compare::lookup::{LookupOptions, lookup};
use care_compare::transcript::Transcript;
use care_compare::{server, store};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Lookup(cmd) => run_lookup(cmd).await.context("lookup failed"),
        cli::Command::Chat(cmd) => run_chat(cmd).await.context("chat failed"),
    }
}

async fn run_lookup(opts: LookupArgs) -> anyhow::Result<()> {
    let http = opts.http.client()?;
    let store = store::open(&opts.store, http)?;
    let out = lookup(
        store.as_ref(),
        &opts.procedure,
        &opts.payer,
        LookupOptions {
            encounter_cap: opts.encounter_cap,
        },
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Line-oriented chat: each line is a question; `:done` marks the latest
/// answer as handled. EOF ends the session.
async fn run_chat(opts: ChatArgs) -> anyhow::Result<()> {
    let relay = opts.relay.relay(opts.http.client()?);
    let mut transcript = Transcript::new();
    println!("{}", transcript.messages()[0].text);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":done" {
            if let Some(id) = transcript.last_ai_id().map(str::to_string) {
                transcript.mark_done(&id);
                println!("(marked {id} as done)");
            }
            continue;
        }

        transcript.push_user(line);
        let turns: Vec<_> = transcript.latest_user_turn().into_iter().collect();
        match relay.relay(&turns).await {
            Ok(resp) => {
                println!("{}", resp.message);
                for hit in &resp.search_results {
                    println!("  - {} (Score: {})", hit.text, hit.score);
                }
                transcript.push_ai(resp.message, resp.search_results);
            }
            Err(e) => {
                let msg = e.client_message();
                eprintln!("{msg}");
                transcript.push_system(msg);
            }
        }
    }
    Ok(())
}
