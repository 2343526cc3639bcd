//! Data models for lending system records.
//!
//! - `Book`, `NewBook`, `CoverImage`: catalog entries and uploads
//! - `User`, `NewUser`, `UserUpdate`: accounts
//! - `Loan`, `NewLoan`, `LoanUpdate`: lending records

pub mod book;
pub mod loan;
pub mod user;

pub use book::{Book, CoverImage, NewBook};
pub use loan::{Loan, LoanUpdate, NewLoan, Related};
pub use user::{NewUser, User, UserUpdate};
