use crate::models::{Book, NewBook};

use super::pagination::fetch_all;
use super::transport::MultipartForm;
use super::{ApiError, Gateway, RequestOptions};

const BOOKS_ENDPOINT: &str = "books/";

/// Catalog access. Creating, replacing and deleting books is restricted to
/// staff server-side.
#[derive(Clone)]
pub struct BooksClient {
    gateway: Gateway,
}

impl BooksClient {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> Result<Vec<Book>, ApiError> {
        fetch_all(&self.gateway, BOOKS_ENDPOINT).await
    }

    /// Catalog entries whose title or author contains `query`, ignoring case.
    /// The API has no search endpoint, so this filters the full listing.
    pub async fn search(&self, query: &str) -> Result<Vec<Book>, ApiError> {
        let books = self.list().await?;
        Ok(books.into_iter().filter(|book| book.matches(query)).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Book, ApiError> {
        self.gateway.get_json(&book_endpoint(id)).await
    }

    pub async fn create(&self, book: &NewBook) -> Result<Book, ApiError> {
        self.gateway
            .send_json(BOOKS_ENDPOINT, RequestOptions::post_multipart(book_form(book)))
            .await
    }

    pub async fn update(&self, id: i64, book: &NewBook) -> Result<Book, ApiError> {
        self.gateway
            .send_json(&book_endpoint(id), RequestOptions::put_multipart(book_form(book)))
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.gateway
            .send_empty(&book_endpoint(id), RequestOptions::delete())
            .await
    }
}

fn book_endpoint(id: i64) -> String {
    format!("{}{}/", BOOKS_ENDPOINT, id)
}

/// Multipart body for a book; absent optional fields are left out.
fn book_form(book: &NewBook) -> MultipartForm {
    let mut form = MultipartForm::new()
        .text("title", book.title.as_str())
        .text("author", book.author.as_str());
    if let Some(year) = book.publication_year {
        form = form.text("publication_year", year.to_string());
    }
    if let Some(ref genre) = book.genre {
        form = form.text("genre", genre.as_str());
    }
    if let Some(ref cover) = book.cover {
        form = form.file(
            "cover_image",
            cover.file_name.as_str(),
            cover.mime.clone(),
            cover.bytes.clone(),
        );
    }
    form
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::api::transport::{FormPart, RequestBody};
    use crate::auth::{MemoryTokenStore, SessionManager};
    use crate::models::CoverImage;
    use crate::testutil::{Reply, ScriptedTransport, BASE_URL};

    fn client(transport: &Arc<ScriptedTransport>) -> BooksClient {
        let manager = SessionManager::new(BASE_URL, transport.clone(), Arc::new(MemoryTokenStore::new()));
        BooksClient::new(manager.gateway())
    }

    #[test]
    fn test_book_form_fields() {
        let form = book_form(&NewBook {
            title: "Capitães da Areia".to_string(),
            author: "Jorge Amado".to_string(),
            publication_year: Some(1937),
            genre: None,
            cover: Some(CoverImage {
                file_name: "capa.jpg".to_string(),
                mime: Some("image/jpeg".to_string()),
                bytes: vec![0xFF, 0xD8],
            }),
        });

        assert_eq!(form.text_value("title"), Some("Capitães da Areia"));
        assert_eq!(form.text_value("publication_year"), Some("1937"));
        assert_eq!(form.text_value("genre"), None);
        let (name, part) = form.parts().last().unwrap();
        assert_eq!(name, "cover_image");
        assert!(matches!(part, FormPart::File { file_name, .. } if file_name == "capa.jpg"));
    }

    #[tokio::test]
    async fn test_list_accepts_flat_and_paginated() {
        let transport = ScriptedTransport::new();
        transport.route(Method::GET, "books/", |_| {
            Reply::json(200, json!({ "count": 1, "results": [{ "id": 1, "title": "Iracema" }] }))
        });
        let books = client(&transport).list().await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Iracema");

        transport.route(Method::GET, "books/", |_| {
            Reply::json(200, json!([{ "id": 1, "title": "Iracema" }, { "id": 2, "title": "O Cortiço" }]))
        });
        let books = client(&transport).list().await.unwrap();
        assert_eq!(books.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_search_filters_by_title_or_author() {
        let transport = ScriptedTransport::new();
        transport.route(Method::GET, "books/", |_| {
            Reply::json(
                200,
                json!([
                    { "id": 1, "title": "Iracema", "author": "José de Alencar" },
                    { "id": 2, "title": "O Cortiço", "author": "Aluísio Azevedo" },
                    { "id": 3, "title": "O Guarani", "author": "José de Alencar" },
                ]),
            )
        });
        let books = client(&transport);

        let found = books.search("alencar").await.unwrap();
        assert_eq!(found.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 3]);

        let found = books.search("CORTIÇO").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);

        assert!(books.search("Machado").await.unwrap().is_empty());
        assert_eq!(books.search("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_and_update_send_multipart() {
        let transport = ScriptedTransport::new();
        transport.route(Method::POST, "books/", |_| Reply::json(201, json!({ "id": 4, "title": "Macunaíma" })));
        transport.route(Method::PUT, "books/4/", |_| Reply::json(200, json!({ "id": 4, "title": "Macunaíma" })));

        let books = client(&transport);
        let new_book = NewBook {
            title: "Macunaíma".to_string(),
            author: "Mário de Andrade".to_string(),
            ..Default::default()
        };
        assert_eq!(books.create(&new_book).await.unwrap().id, 4);
        books.update(4, &new_book).await.unwrap();

        for (method, path) in [(Method::POST, "books/"), (Method::PUT, "books/4/")] {
            let sent = transport.requests_to(&method, path);
            assert!(matches!(&sent[0].body, RequestBody::Multipart(form) if form.text_value("author") == Some("Mário de Andrade")));
        }
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let transport = ScriptedTransport::new();
        transport.route(Method::GET, "books/2/", |_| Reply::json(200, json!({ "id": 2, "title": "O Cortiço" })));
        transport.route(Method::DELETE, "books/2/", |_| Reply::Respond(204, String::new()));

        let books = client(&transport);
        assert_eq!(books.get(2).await.unwrap().title, "O Cortiço");
        books.delete(2).await.unwrap();
        assert_eq!(transport.calls_to(&Method::DELETE, "books/2/"), 1);
    }
}
