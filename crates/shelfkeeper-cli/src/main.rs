//! shelfkeeper - command-line client for the school library lending service.
//!
//! Signs in against the library API, keeps the session on disk (or in the
//! OS keychain) between runs, and lists or changes books, users and loans.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shelfkeeper_core::Config;

/// Command line interface for shelfkeeper
#[derive(Parser, Debug)]
#[command(name = "shelfkeeper")]
#[command(about = "School library lending from the terminal")]
#[command(version)]
struct Cli {
    /// API base URL (overrides config and SHELFKEEPER_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show who is signed in
    Status,
    /// Catalog
    #[command(subcommand)]
    Books(BooksCommand),
    /// Accounts
    #[command(subcommand)]
    Users(UsersCommand),
    /// Lending records
    #[command(subcommand)]
    Loans(LoansCommand),
}

#[derive(Subcommand, Debug)]
enum BooksCommand {
    List {
        /// Only books whose title or author contains this text
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Add a book to the catalog (staff only)
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        genre: Option<String>,
        /// Cover image file to upload
        #[arg(long)]
        cover: Option<PathBuf>,
    },
    /// Remove a book from the catalog (staff only)
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum UsersCommand {
    List,
    /// Create an account; the password is prompted for (staff only)
    Add {
        #[arg(long)]
        username: String,
        #[arg(long)]
        turma: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Grant staff rights
        #[arg(long)]
        staff: bool,
    },
    /// Delete an account (staff only)
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
enum LoansCommand {
    List {
        /// Only loans not yet returned
        #[arg(long)]
        active: bool,
    },
    /// Borrow a book
    Create {
        #[arg(long)]
        book: i64,
        /// Borrower id; defaults to the signed-in user
        #[arg(long)]
        user: Option<i64>,
        #[arg(long)]
        turma: String,
    },
    /// Check one or more loans back in
    Return {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=shelfkeeper_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url;
    }
    debug!(api = %config.base_url(), store = ?config.token_store, "Configuration loaded");

    match cli.command {
        Command::Login { username } => commands::login(&config, username).await,
        Command::Logout => commands::logout(&config),
        Command::Status => commands::status(&config).await,
        Command::Books(BooksCommand::List { query }) => commands::list_books(&config, query).await,
        Command::Books(BooksCommand::Add {
            title,
            author,
            year,
            genre,
            cover,
        }) => commands::add_book(&config, title, author, year, genre, cover).await,
        Command::Books(BooksCommand::Delete { id }) => commands::delete_book(&config, id).await,
        Command::Users(UsersCommand::List) => commands::list_users(&config).await,
        Command::Users(UsersCommand::Add {
            username,
            turma,
            email,
            staff,
        }) => commands::add_user(&config, username, turma, email, staff).await,
        Command::Users(UsersCommand::Delete { id }) => commands::delete_user(&config, id).await,
        Command::Loans(LoansCommand::List { active }) => commands::list_loans(&config, active).await,
        Command::Loans(LoansCommand::Create { book, user, turma }) => {
            commands::create_loan(&config, book, user, turma).await
        }
        Command::Loans(LoansCommand::Return { ids }) => commands::return_loans(&config, ids).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_loans_return_many() {
        let cli = Cli::parse_from(["shelfkeeper", "loans", "return", "3", "5"]);
        assert!(matches!(cli.command, Command::Loans(LoansCommand::Return { ref ids }) if ids == &vec![3, 5]));
    }

    #[test]
    fn test_parse_global_api_url() {
        let cli = Cli::parse_from(["shelfkeeper", "books", "list", "--api-url", "http://x/api/"]);
        assert_eq!(cli.api_url.as_deref(), Some("http://x/api/"));
        assert!(matches!(cli.command, Command::Books(BooksCommand::List { query: None })));
    }

    #[test]
    fn test_parse_books_list_query() {
        let cli = Cli::parse_from(["shelfkeeper", "books", "list", "-q", "machado"]);
        assert!(matches!(cli.command, Command::Books(BooksCommand::List { query: Some(ref q) }) if q == "machado"));
    }

    #[test]
    fn test_parse_admin_commands() {
        let cli = Cli::parse_from(["shelfkeeper", "books", "delete", "12"]);
        assert!(matches!(cli.command, Command::Books(BooksCommand::Delete { id: 12 })));

        let cli = Cli::parse_from(["shelfkeeper", "users", "add", "--username", "joao", "--turma", "3A"]);
        match cli.command {
            Command::Users(UsersCommand::Add {
                username,
                turma,
                email,
                staff,
            }) => {
                assert_eq!(username, "joao");
                assert_eq!(turma.as_deref(), Some("3A"));
                assert!(email.is_none());
                assert!(!staff);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from(["shelfkeeper", "users", "delete", "7"]);
        assert!(matches!(cli.command, Command::Users(UsersCommand::Delete { id: 7 })));

        assert!(Cli::try_parse_from(["shelfkeeper", "users", "add"]).is_err());
    }
}
