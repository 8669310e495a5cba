mod cli;
mod commands;
mod daily;
mod delete;
mod events;
mod gist;
mod model;
mod reconcile;
mod recurrence;
mod scheduler;
mod storage;
mod store;
mod ui;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    let command = args.command.unwrap_or(cli::Command::Tui);
    match command {
        cli::Command::Login { token, gist } => commands::login(token, gist).await,
        cli::Command::Add { title, group, date } => commands::add(title, group, date).await,
        cli::Command::Schedule {
            title,
            freq,
            start,
            end,
            days,
            interval,
            group,
        } => commands::schedule(title, freq, start, end, days, interval, group).await,
        cli::Command::List { date, all } => commands::list(date, all).await,
        cli::Command::Schedules => commands::schedules().await,
        cli::Command::Toggle { title, date, group } => commands::toggle(title, date, group).await,
        cli::Command::Delete {
            title,
            date,
            group,
            choice,
        } => commands::delete(title, date, group, choice).await,
        cli::Command::Run { force } => commands::run(force).await,
        cli::Command::Tui => commands::tui().await,
    }
}
