//! Page-walking fetch loop over GitLab list endpoints.
//!
//! A [`Paginator`] wraps a single-page fetch function and turns it into a
//! lazy stream of records. Each call to [`Paginator::stream`] starts again
//! from page 1.
//!
//! The walk stops when:
//! - the reported current page reaches the reported total page count, or
//!   when no total is reported, no next page is named,
//! - a page comes back empty, or
//! - a cutoff is set and a page contains a record updated before it. The
//!   endpoint must return records newest-updated first for this to be sound.
//!
//! A failed page fetch yields the error and ends the stream. Records already
//! yielded stay yielded.

use crate::error::AppError;
use crate::services::gitlab_client::PaginatedResponse;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use std::future::Future;

/// Cutoff for incremental fetches.
struct Cutoff<T> {
    after: DateTime<Utc>,
    updated_at: fn(&T) -> DateTime<Utc>,
}

/// Walks the pages of a list endpoint.
pub struct Paginator<T, F> {
    fetch: F,
    cutoff: Option<Cutoff<T>>,
}

impl<T, F, Fut> Paginator<T, F>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<PaginatedResponse<T>, AppError>>,
{
    /// Paginate over `fetch`, which requests one page by number.
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            cutoff: None,
        }
    }

    /// Stop after the first page holding a record updated before `after`.
    ///
    /// `None` leaves the walk unbounded.
    pub fn with_cutoff(
        mut self,
        after: Option<DateTime<Utc>>,
        updated_at: fn(&T) -> DateTime<Utc>,
    ) -> Self {
        self.cutoff = after.map(|after| Cutoff { after, updated_at });
        self
    }

    /// Page to request after `page`, or `None` when the walk is over.
    fn next_page(&self, page: &PaginatedResponse<T>) -> Option<u32> {
        if page.data.is_empty() {
            return None;
        }

        if let Some(cutoff) = &self.cutoff {
            if page
                .data
                .iter()
                .any(|record| (cutoff.updated_at)(record) < cutoff.after)
            {
                return None;
            }
        }

        let info = &page.pagination;
        match info.total_pages {
            Some(total) if info.page >= total => None,
            Some(_) => Some(info.next_page.unwrap_or(info.page + 1)),
            None => info.next_page,
        }
    }

    /// Lazily fetch every record, starting from page 1.
    pub fn stream<'a>(&'a self) -> impl Stream<Item = Result<T, AppError>> + 'a
    where
        T: 'a,
        Fut: 'a,
    {
        stream::try_unfold(Some(1u32), move |next| async move {
            let Some(page_number) = next else {
                return Ok::<_, AppError>(None);
            };

            let page = (self.fetch)(page_number).await?;
            let next = self.next_page(&page);
            Ok(Some((page.data, next)))
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<T, AppError>)))
        .try_flatten()
    }

    /// Fetch every record into memory.
    pub async fn collect_all<'a>(&'a self) -> Result<Vec<T>, AppError>
    where
        T: 'a,
        Fut: 'a,
    {
        self.stream().try_collect().await
    }

    /// Fetch records until the stream ends or fails, keeping what arrived.
    ///
    /// Returns the records yielded before any failure along with the failure.
    pub async fn collect_partial<'a>(&'a self) -> (Vec<T>, Option<AppError>)
    where
        T: 'a,
        Fut: 'a,
    {
        let mut records = Vec::new();
        let mut pages = std::pin::pin!(self.stream());
        while let Some(next) = pages.next().await {
            match next {
                Ok(record) => records.push(record),
                Err(e) => return (records, Some(e)),
            }
        }
        (records, None)
    }
}
