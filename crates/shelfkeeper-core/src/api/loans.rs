use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::models::{Loan, LoanUpdate, NewLoan};

use super::pagination::fetch_all;
use super::{to_json, ApiError, Gateway, RequestOptions};

const LOANS_ENDPOINT: &str = "loans/";

/// Upper bound on loan requests in flight for bulk operations
const MAX_CONCURRENT_REQUESTS: usize = 10;

#[derive(Clone)]
pub struct LoansClient {
    gateway: Gateway,
}

impl LoansClient {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> Result<Vec<Loan>, ApiError> {
        fetch_all(&self.gateway, LOANS_ENDPOINT).await
    }

    /// Loans whose book has not come back yet
    pub async fn active(&self) -> Result<Vec<Loan>, ApiError> {
        let loans = self.list().await?;
        Ok(loans.into_iter().filter(Loan::is_active).collect())
    }

    /// Borrow a book. Without `user_id` the server lends to the caller.
    pub async fn create(&self, loan: &NewLoan) -> Result<Loan, ApiError> {
        self.gateway
            .send_json(LOANS_ENDPOINT, RequestOptions::post_json(to_json(loan)?))
            .await
    }

    pub async fn update(&self, id: i64, changes: &LoanUpdate) -> Result<Loan, ApiError> {
        self.gateway
            .send_json(&loan_endpoint(id), RequestOptions::patch_json(to_json(changes)?))
            .await
    }

    /// Flag the loan returned through a partial update.
    pub async fn mark_returned(&self, id: i64) -> Result<Loan, ApiError> {
        self.update(id, &LoanUpdate::mark_returned()).await
    }

    /// Check the book back in through the dedicated return action, which
    /// also makes the book available again.
    pub async fn return_book(&self, id: i64) -> Result<Loan, ApiError> {
        self.gateway
            .send_json(&format!("{}devolver/", loan_endpoint(id)), RequestOptions::post())
            .await
    }

    /// Return several loans with limited concurrency. Results come back in
    /// completion order, paired with the loan id.
    pub async fn return_books(&self, ids: Vec<i64>) -> Vec<(i64, Result<Loan, ApiError>)> {
        debug!(count = ids.len(), max = MAX_CONCURRENT_REQUESTS, "Returning loans");

        stream::iter(ids)
            .map(|id| async move { (id, self.return_book(id).await) })
            .buffer_unordered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.gateway
            .send_empty(&loan_endpoint(id), RequestOptions::delete())
            .await
    }
}

fn loan_endpoint(id: i64) -> String {
    format!("{}{}/", LOANS_ENDPOINT, id)
}
