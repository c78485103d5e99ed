//! Binary entry point: load settings, open the SQLite store, then either run a
//! one-shot command or drive the Ratatui event loop until the user exits.
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Env, Target};

use library_circulation::circulation::tracking_label;
use library_circulation::config::data_dir;
use library_circulation::transfer::{export_tables, import_tables};
use library_circulation::{open_database, run_app, App, Library, Settings};

#[derive(Parser)]
#[command(name = "library-circulation", about = "Library circulation manager")]
struct Cli {
    /// Database file to use instead of the configured one.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write every table to <DIR>/<table>.csv.
    Export { dir: PathBuf },
    /// Upsert every <DIR>/<table>.csv into the database.
    Import { dir: PathBuf },
    /// List overdue loans and the fines they would carry today.
    Overdue,
    /// Print catalog statistics, popular titles and active borrowers.
    Report,
    /// List every book currently on loan.
    Track,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.is_none())?;

    let settings = Settings::load()?;
    let db_path = settings.resolve_database_path(cli.db)?;
    let conn = open_database(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;

    match cli.command {
        None => {
            let library = Library::new(conn, settings.policy);
            let mut app = App::new(library)?;
            let result = run_app(&mut app);
            app.into_library().close()?;
            result
        }
        Some(Command::Export { dir }) => {
            let stats = export_tables(&conn, &dir).context("export failed")?;
            for (table, rows) in stats {
                println!("{table:<16} {rows:>6} rows");
            }
            Ok(())
        }
        Some(Command::Import { dir }) => {
            let mut conn = conn;
            let stats = import_tables(&mut conn, &dir).context("import failed")?;
            for (table, rows) in stats {
                println!("{table:<16} {rows:>6} rows");
            }
            Ok(())
        }
        Some(Command::Overdue) => {
            let library = Library::new(conn, settings.policy);
            let report = library.overdue_books()?;
            if report.loans.is_empty() {
                println!("No overdue books.");
            }
            for loan in &report.loans {
                println!(
                    "{:<20} {:<30} due {}  {:>3} days  fine {:>8.2}",
                    loan.username.as_deref().unwrap_or("(removed)"),
                    loan.title,
                    loan.due_date,
                    loan.days_overdue,
                    loan.fine
                );
            }
            println!("Total fine: {:.2}", report.total_fine);
            library.close()?;
            Ok(())
        }
        Some(Command::Report) => {
            let library = Library::new(conn, settings.policy);
            let report = library.generate_reports()?;
            let summary = report.summary;
            println!("Unique titles:    {}", summary.unique_titles);
            println!("Total copies:     {}", summary.total_copies);
            println!("Available copies: {}", summary.available_copies);
            println!("Borrowed copies:  {}", summary.borrowed_copies);
            println!();
            println!("Most borrowed:");
            for book in &report.popular_books {
                println!("  {:<30} {:>4}", book.title, book.borrow_count);
            }
            println!("Active borrowers:");
            for borrower in &report.active_borrowers {
                println!("  {:<20} {:>2}", borrower.username, borrower.active_loans);
            }
            library.close()?;
            Ok(())
        }
        Some(Command::Track) => {
            let library = Library::new(conn, settings.policy);
            for loan in library.track_books()? {
                println!(
                    "{:<20} {:<30} due {}  {}",
                    loan.username.as_deref().unwrap_or("(removed)"),
                    loan.title,
                    loan.due_date,
                    tracking_label(loan.status)
                );
            }
            library.close()?;
            Ok(())
        }
    }
}

/// Route log output to stderr for one-shot commands, or to `library.log` in
/// the data directory while the TUI owns the terminal.
fn init_logging(interactive: bool) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if interactive {
        let dir = data_dir()?;
        fs::create_dir_all(&dir).context("failed to create data directory")?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("library.log"))
            .context("failed to open log file")?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
