use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(alias = "year")]
    pub publication_year: Option<i32>,
    #[serde(alias = "category")]
    pub genre: Option<String>,
    /// URL of the uploaded cover, as served by the API
    pub cover_image: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl Book {
    pub fn display_year(&self) -> String {
        match self.publication_year {
            Some(year) => year.to_string(),
            None => "-".to_string(),
        }
    }

    /// Case-insensitive substring match on title or author. A blank query
    /// matches every book.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty()
            || self.title.to_lowercase().contains(&query)
            || self.author.to_lowercase().contains(&query)
    }

    pub fn availability_label(&self) -> &'static str {
        if self.available {
            "Available"
        } else {
            "On loan"
        }
    }
}

/// Cover image uploaded with a book.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverImage {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Fields sent when creating or replacing a book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub publication_year: Option<i32>,
    pub genre: Option<String>,
    pub cover: Option<CoverImage>,
}
