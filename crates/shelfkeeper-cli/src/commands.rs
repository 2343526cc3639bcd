//! Command handlers. Each one builds its own session from the config,
//! resumes the stored login where needed, and prints plain text to stdout.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use tracing::{debug, warn};

use shelfkeeper_core::auth::RenewalTask;
use shelfkeeper_core::models::{Book, CoverImage, Loan, NewBook, NewLoan, NewUser, User};
use shelfkeeper_core::utils::{format_optional, truncate_string};
use shelfkeeper_core::{
    ApiError, AuthStatus, BooksClient, Config, LoansClient, Role, SessionManager, UsersClient,
};

const TITLE_WIDTH: usize = 32;
const NAME_WIDTH: usize = 20;

/// Render a library error the way an end user should see it
fn friendly(e: ApiError) -> anyhow::Error {
    debug!(error = %e, "Request failed");
    anyhow!(e.user_message())
}

/// Resume the stored session, failing when nobody is signed in.
/// The renewal task keeps the token fresh for long-running commands.
async fn signed_in(config: &Config) -> Result<(SessionManager, RenewalTask)> {
    let manager = config.connect()?;
    match manager.bootstrap().await {
        AuthStatus::Authenticated => {
            let renewal = manager.spawn_renewal(config.renewal_interval());
            Ok((manager, renewal))
        }
        _ => bail!("Not signed in. Run `shelfkeeper login` first."),
    }
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim();
    Ok(match (value.is_empty(), default) {
        (true, Some(default)) => default.to_string(),
        _ => value.to_string(),
    })
}

pub async fn login(config: &Config, username: Option<String>) -> Result<()> {
    let username = match username {
        Some(username) => username,
        None => prompt("Username", config.last_username.as_deref())?,
    };
    if username.is_empty() {
        bail!("Username required");
    }
    let password = rpassword::prompt_password("Password: ")?;

    let manager = config.connect()?;
    let session = manager.login(&username, &password).await.map_err(friendly)?;
    println!("Signed in as {} ({})", session.claims().username, session.role());

    if let Err(e) = Config::remember_username(&username) {
        warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

pub fn logout(config: &Config) -> Result<()> {
    config.connect()?.logout();
    println!("Signed out");
    Ok(())
}

pub async fn status(config: &Config) -> Result<()> {
    let manager = config.connect()?;
    if manager.bootstrap().await != AuthStatus::Authenticated {
        println!("Not signed in");
        return Ok(());
    }

    let claims = manager.claims().context("Session has no claims")?;
    println!("User:    {}", claims.username);
    println!("Role:    {}", manager.role());
    if !claims.email.is_empty() {
        println!("Email:   {}", claims.email);
    }
    if let Some(user) = manager.current_user() {
        println!("Turma:   {}", format_optional(&user.turma, "-"));
    }
    if let Some(expires) = claims.expires_at() {
        println!("Expires: {}", expires.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

pub async fn list_books(config: &Config, query: Option<String>) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    let client = BooksClient::new(manager.gateway());
    let books = match query.as_deref() {
        Some(query) => client.search(query).await,
        None => client.list().await,
    }
    .map_err(friendly)?;

    println!("{:>5}  {:<TITLE_WIDTH$}  {:<NAME_WIDTH$}  {:>4}  {}", "ID", "TITLE", "AUTHOR", "YEAR", "STATUS");
    for book in &books {
        println!("{}", book_row(book));
    }
    println!("{} book(s)", books.len());
    Ok(())
}

pub async fn add_book(
    config: &Config,
    title: String,
    author: String,
    year: Option<i32>,
    genre: Option<String>,
    cover: Option<PathBuf>,
) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    if !manager.has_role(Role::Admin) {
        bail!("Adding books requires a staff account");
    }

    let cover = cover.as_deref().map(read_cover).transpose()?;
    let book = BooksClient::new(manager.gateway())
        .create(&NewBook {
            title,
            author,
            publication_year: year,
            genre,
            cover,
        })
        .await
        .map_err(friendly)?;
    println!("Added book #{}: {}", book.id, book.title);
    Ok(())
}

pub async fn delete_book(config: &Config, id: i64) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    if !manager.has_role(Role::Admin) {
        bail!("Removing books requires a staff account");
    }
    BooksClient::new(manager.gateway()).delete(id).await.map_err(friendly)?;
    println!("Removed book #{}", id);
    Ok(())
}

pub async fn list_users(config: &Config) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    let users = UsersClient::new(manager.gateway()).list().await.map_err(friendly)?;

    println!("{:>5}  {:<NAME_WIDTH$}  {:<10}  {}", "ID", "USERNAME", "ROLE", "TURMA");
    for user in &users {
        println!("{}", user_row(user));
    }
    Ok(())
}

pub async fn add_user(
    config: &Config,
    username: String,
    turma: Option<String>,
    email: Option<String>,
    staff: bool,
) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    if !manager.has_role(Role::Admin) {
        bail!("Creating accounts requires a staff account");
    }

    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;
    if password.is_empty() {
        bail!("Password required");
    }
    if rpassword::prompt_password("Repeat password: ")? != password {
        bail!("Passwords do not match");
    }

    let user = UsersClient::new(manager.gateway())
        .create(&NewUser {
            username,
            password,
            email,
            turma,
            is_staff: staff,
        })
        .await
        .map_err(friendly)?;
    println!("Created user #{}: {} ({})", user.id, user.username, user.role());
    Ok(())
}

pub async fn delete_user(config: &Config, id: i64) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    if !manager.has_role(Role::Admin) {
        bail!("Removing accounts requires a staff account");
    }
    UsersClient::new(manager.gateway()).delete(id).await.map_err(friendly)?;
    println!("Removed user #{}", id);
    Ok(())
}

pub async fn list_loans(config: &Config, active_only: bool) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    let client = LoansClient::new(manager.gateway());
    let loans = if active_only {
        client.active().await
    } else {
        client.list().await
    }
    .map_err(friendly)?;

    println!("{:>5}  {:<TITLE_WIDTH$}  {:<NAME_WIDTH$}  {:<12}  {}", "ID", "BOOK", "BORROWER", "BORROWED", "STATUS");
    for loan in &loans {
        println!("{}", loan_row(loan));
    }
    println!("{} loan(s)", loans.len());
    Ok(())
}

pub async fn create_loan(config: &Config, book_id: i64, user_id: Option<i64>, turma: String) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    let loan = LoansClient::new(manager.gateway())
        .create(&NewLoan {
            book_id,
            user_id,
            turma,
        })
        .await
        .map_err(friendly)?;
    println!("Loan #{} created for {}", loan.id, loan.display_book());
    Ok(())
}

pub async fn return_loans(config: &Config, ids: Vec<i64>) -> Result<()> {
    let (manager, _renewal) = signed_in(config).await?;
    let total = ids.len();
    let outcomes = LoansClient::new(manager.gateway()).return_books(ids).await;

    let mut failed = 0;
    for (id, outcome) in outcomes {
        match outcome {
            Ok(loan) => println!("Loan #{} returned: {}", id, loan.display_book()),
            Err(e) => {
                failed += 1;
                eprintln!("Loan #{} not returned: {}", id, e.user_message());
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} return(s) failed", failed, total);
    }
    Ok(())
}

fn read_cover(path: &Path) -> Result<CoverImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Could not read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cover".to_string());
    Ok(CoverImage {
        mime: mime_for(path).map(str::to_string),
        file_name,
        bytes,
    })
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn book_row(book: &Book) -> String {
    format!(
        "{:>5}  {:<TITLE_WIDTH$}  {:<NAME_WIDTH$}  {:>4}  {}",
        book.id,
        truncate_string(&book.title, TITLE_WIDTH),
        truncate_string(&book.author, NAME_WIDTH),
        book.display_year(),
        book.availability_label()
    )
}

fn user_row(user: &User) -> String {
    format!(
        "{:>5}  {:<NAME_WIDTH$}  {:<10}  {}",
        user.id,
        truncate_string(&user.username, NAME_WIDTH),
        user.role().to_string(),
        format_optional(&user.turma, "-")
    )
}

fn loan_row(loan: &Loan) -> String {
    format!(
        "{:>5}  {:<TITLE_WIDTH$}  {:<NAME_WIDTH$}  {:<12}  {}",
        loan.id,
        truncate_string(&loan.display_book(), TITLE_WIDTH),
        truncate_string(&loan.display_borrower(), NAME_WIDTH),
        loan.display_borrowed_at(),
        loan.status_label()
    )
}
