mod auth;
mod dataset;
mod filter;
mod query;
mod report;
mod session;
mod settings;

use std::io::{self, IsTerminal, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    auth::UserStore,
    dataset::Dataset,
    session::{Reply, Session},
    settings::{Args, Settings},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if let Some(password) = &args.hash_password {
        println!("{}", auth::hash_password(password)?);
        return Ok(());
    }

    let settings = match args.config_path() {
        Some(path) => Settings::from_file(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::from_defaults()?,
    };
    let extractor = query::build_extractor(&settings.extractor, &settings.llm);

    if let Some(utterance) = &args.parse {
        let query = extractor.extract(utterance).await;
        println!("{}", serde_json::to_string_pretty(&query)?);
        return Ok(());
    }

    let dataset = Dataset::load(&settings.data.orders)?;
    let users = UserStore::load(&settings.data.users)?;
    let mut session = Session::new(&dataset, &users, extractor.as_ref(), &settings.forecast);

    println!("Sales Dashboard (type 'exit' to quit)");
    let stdin = io::stdin();
    loop {
        print!("{}", session.prompt());
        io::stdout().flush()?;

        let line = if session.wants_password() && stdin.is_terminal() {
            rpassword::read_password()?
        } else {
            let mut line = String::new();
            if stdin.read_line(&mut line)? == 0 {
                break;
            }
            line
        };
        match session.handle(&line).await {
            Ok(Reply::Text(text)) => println!("{text}"),
            Ok(Reply::Silent) => {}
            Ok(Reply::Quit) => break,
            Err(e) => println!("{e:#}"),
        }
    }
    info!("Session ended with {}", session.filters());
    Ok(())
}
