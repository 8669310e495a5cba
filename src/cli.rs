use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "daygist", version, about = "Daily task checklist backed by a GitHub Gist")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store the API token and bootstrap the remote document
    Login {
        /// Personal access token with gist scope
        #[arg(long)]
        token: String,
        /// Reuse an existing document id instead of creating one
        #[arg(long)]
        gist: Option<String>,
    },
    /// Add a one-off task (no backing schedule)
    Add {
        /// Title of the task
        title: String,
        /// Optional category label
        #[arg(long)]
        group: Option<String>,
        /// Date the task belongs to, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Create a recurring schedule definition
    Schedule {
        /// Base title (the 3-digit tag is appended to derived instances)
        title: String,
        /// once | daily | weekly | monthly
        #[arg(long)]
        freq: String,
        /// First active date (defaults to today)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last active date, inclusive
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Weekday for weekly schedules (repeatable, e.g. -d Mon -d Wed)
        #[arg(long = "day", short = 'd')]
        days: Vec<String>,
        /// Every-N-days cadence (weekly) or day of month (monthly)
        #[arg(long)]
        interval: Option<u32>,
        /// Optional category label
        #[arg(long)]
        group: Option<String>,
    },
    /// List task instances for a day
    List {
        /// Date to list, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// List every stored instance regardless of date
        #[arg(long)]
        all: bool,
    },
    /// List schedule definitions
    Schedules,
    /// Flip an instance's done state
    Toggle {
        /// Stored title of the instance (including any tag)
        title: String,
        /// Date of the instance (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Category label of the instance
        #[arg(long)]
        group: Option<String>,
    },
    /// Delete an instance, or its schedule
    Delete {
        /// Stored title of the instance (including any tag)
        title: String,
        /// Date of the instance (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Category label of the instance
        #[arg(long)]
        group: Option<String>,
        /// delete-this | delete-scheduling | delete-all (omit to list choices)
        #[arg(long)]
        choice: Option<String>,
    },
    /// Materialize today's instances through the once-per-day gate
    Run {
        /// Bypass the gate and materialize again
        #[arg(long)]
        force: bool,
    },
    /// Launch the interactive checklist
    Tui,
}
