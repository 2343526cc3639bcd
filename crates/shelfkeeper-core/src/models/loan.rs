use serde::{Deserialize, Serialize};

use crate::utils::format_date;

/// A related record as the API embeds it: either a bare id or a nested
/// object (`{"id": 1, "title": ...}` for books, `{"id": 2, "username": ...}`
/// for users).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Related {
    Id(i64),
    Record {
        #[serde(default)]
        id: Option<i64>,
        #[serde(default, alias = "title", alias = "username")]
        label: Option<String>,
    },
}

impl Related {
    pub fn id(&self) -> Option<i64> {
        match self {
            Related::Id(id) => Some(*id),
            Related::Record { id, .. } => *id,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Related::Id(_) => None,
            Related::Record { label, .. } => label.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    #[serde(default)]
    pub book: Option<Related>,
    #[serde(default)]
    pub book_title: Option<String>,
    #[serde(default)]
    pub user: Option<Related>,
    #[serde(default, alias = "user_username", alias = "username")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub turma: Option<String>,
    #[serde(default, alias = "loan_date")]
    pub borrowed_at: Option<String>,
    #[serde(default, alias = "return_date")]
    pub returned_at: Option<String>,
    #[serde(default)]
    pub returned: bool,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        !self.returned
    }

    pub fn book_id(&self) -> Option<i64> {
        self.book.as_ref().and_then(Related::id)
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().and_then(Related::id)
    }

    /// Title from the flat field or the embedded book
    pub fn display_book(&self) -> String {
        self.book_title
            .as_deref()
            .or_else(|| self.book.as_ref().and_then(Related::label))
            .map(str::to_string)
            .or_else(|| self.book_id().map(|id| format!("Book #{}", id)))
            .unwrap_or_else(|| "Unknown book".to_string())
    }

    pub fn display_borrower(&self) -> String {
        self.user_name
            .as_deref()
            .or_else(|| self.user.as_ref().and_then(Related::label))
            .map(str::to_string)
            .or_else(|| self.user_id().map(|id| format!("User #{}", id)))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn display_borrowed_at(&self) -> String {
        self.borrowed_at
            .as_deref()
            .map(format_date)
            .unwrap_or_else(|| "-".to_string())
    }

    pub fn status_label(&self) -> &'static str {
        if self.returned {
            "Returned"
        } else {
            "Active"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewLoan {
    pub book_id: i64,
    /// Borrower; the server assigns the requesting user when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub turma: String,
}

/// Partial update for `PATCH loans/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoanUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turma: Option<String>,
}

impl LoanUpdate {
    pub fn mark_returned() -> Self {
        Self {
            returned: Some(true),
            ..Default::default()
        }
    }
}
