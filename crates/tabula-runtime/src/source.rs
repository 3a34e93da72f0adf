#![forbid(unsafe_code)]

//! Server-side data source.
//!
//! In server mode the table sends a [`FetchRequest`] describing the page it
//! wants and receives one page of records plus the total row count. Every
//! request gets a monotonically increasing [`Ticket`]; only the most recent
//! ticket's completion is applied, so a slow response to an old request can
//! never overwrite a newer one.
//!
//! While a fetch is in flight, or after one fails, the previous rows stay in
//! place. Failures are reported through [`FetchStatus::Failed`].

use std::fmt;
use std::sync::{Arc, mpsc};
use std::thread;

use serde::{Deserialize, Serialize};
use tabula_core::{ColumnFilter, SortEntry, TableState};

/// What the server is asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub page_index: usize,
    pub page_size: usize,
    pub sorting: Vec<SortEntry>,
    pub filters: Vec<ColumnFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_filter: Option<String>,
}

impl FetchRequest {
    /// The request matching a table state.
    #[must_use]
    pub fn from_state(state: &TableState) -> Self {
        Self {
            page_index: state.pagination.page_index,
            page_size: state.pagination.page_size,
            sorting: state.sorting.clone(),
            filters: state.column_filters.clone(),
            global_filter: state.global_filter_text().map(str::to_owned),
        }
    }
}

/// One page of records and the total across all pages.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse<R> {
    pub rows: Vec<R>,
    pub total_count: usize,
}

/// A fetch that did not produce rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFetchError {
    /// The source rejected or failed the request.
    Failed(String),
    /// The fetch thread went away before answering.
    Disconnected,
    /// A worker thread could not be started.
    Spawn(String),
}

impl fmt::Display for SourceFetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(msg) => write!(f, "data source fetch failed: {msg}"),
            Self::Disconnected => f.write_str("data source fetch thread disconnected"),
            Self::Spawn(msg) => write!(f, "could not start fetch thread: {msg}"),
        }
    }
}

impl std::error::Error for SourceFetchError {}

/// A server that answers page requests.
pub trait DataSource<R>: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse<R>, SourceFetchError>;
}

impl<R, F> DataSource<R> for F
where
    F: Fn(&FetchRequest) -> Result<FetchResponse<R>, SourceFetchError> + Send + Sync,
{
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse<R>, SourceFetchError> {
        self(request)
    }
}

/// Fetch sequence number. Later requests have larger tickets.
pub type Ticket = u64;

/// State of the most recent fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchStatus {
    /// No fetch has been issued.
    #[default]
    Idle,
    Loading { ticket: Ticket },
    Ready { ticket: Ticket },
    Failed { ticket: Ticket, error: SourceFetchError },
}

impl FetchStatus {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchStatus::Loading { .. })
    }

    #[must_use]
    pub fn error(&self) -> Option<&SourceFetchError> {
        match self {
            FetchStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

type Outcome<R> = Result<FetchResponse<R>, SourceFetchError>;

/// Issues fetches and enforces last-request-wins.
///
/// Each background fetch answers on its own channel. A worker that dies
/// without answering drops its sender, which surfaces as
/// [`SourceFetchError::Disconnected`].
pub struct FetchCoordinator<R> {
    source: Arc<dyn DataSource<R>>,
    next_ticket: Ticket,
    latest: Option<Ticket>,
    status: FetchStatus,
    pending: Vec<(Ticket, mpsc::Receiver<Outcome<R>>)>,
}

impl<R> fmt::Debug for FetchCoordinator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("next_ticket", &self.next_ticket)
            .field("latest", &self.latest)
            .field("status", &self.status)
            .field("in_flight", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<R: Send + 'static> FetchCoordinator<R> {
    #[must_use]
    pub fn new(source: Arc<dyn DataSource<R>>) -> Self {
        Self {
            source,
            next_ticket: 1,
            latest: None,
            status: FetchStatus::Idle,
            pending: Vec::new(),
        }
    }

    #[must_use]
    pub fn status(&self) -> &FetchStatus {
        &self.status
    }

    /// Ticket of the most recent request, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Ticket> {
        self.latest
    }

    /// Background fetches not yet drained by [`poll`](Self::poll).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Reserve the next ticket and mark it as the one to apply.
    pub fn begin(&mut self) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.latest = Some(ticket);
        self.status = FetchStatus::Loading { ticket };
        ticket
    }

    /// Apply a completion. Returns the response when `ticket` is the latest
    /// and the fetch succeeded; stale completions are discarded.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<FetchResponse<R>, SourceFetchError>,
    ) -> Option<FetchResponse<R>> {
        if self.latest != Some(ticket) {
            tracing::warn!(ticket, latest = ?self.latest, "superseded fetch result discarded");
            return None;
        }
        match result {
            Ok(response) => {
                tracing::debug!(
                    ticket,
                    rows = response.rows.len(),
                    total = response.total_count,
                    "fetch applied"
                );
                self.status = FetchStatus::Ready { ticket };
                Some(response)
            }
            Err(error) => {
                tracing::warn!(ticket, %error, "fetch failed; keeping previous rows");
                self.status = FetchStatus::Failed { ticket, error };
                None
            }
        }
    }

    /// Fetch on the calling thread.
    pub fn fetch_blocking(&mut self, request: &FetchRequest) -> Option<FetchResponse<R>> {
        let ticket = self.begin();
        let result = self.source.fetch(request);
        self.complete(ticket, result)
    }

    /// Fetch on a worker thread. The result is picked up by
    /// [`poll`](Self::poll) or [`wait`](Self::wait).
    pub fn spawn(&mut self, request: FetchRequest) -> Ticket {
        let ticket = self.begin();
        let source = Arc::clone(&self.source);
        let (sender, receiver) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("tabula-fetch-{ticket}"))
            .spawn(move || {
                let _ = sender.send(source.fetch(&request));
            });
        match spawned {
            Ok(_) => self.pending.push((ticket, receiver)),
            Err(e) => {
                let _ = self.complete(ticket, Err(SourceFetchError::Spawn(e.to_string())));
            }
        }
        ticket
    }

    /// Drain finished background fetches. Returns the latest ticket's
    /// response if it arrived since the last poll.
    pub fn poll(&mut self) -> Option<FetchResponse<R>> {
        let mut finished = Vec::new();
        self.pending.retain(|(ticket, receiver)| match receiver.try_recv() {
            Ok(outcome) => {
                finished.push((*ticket, outcome));
                false
            }
            Err(mpsc::TryRecvError::Empty) => true,
            Err(mpsc::TryRecvError::Disconnected) => {
                finished.push((*ticket, Err(SourceFetchError::Disconnected)));
                false
            }
        });

        let mut applied = None;
        for (ticket, outcome) in finished {
            if let Some(response) = self.complete(ticket, outcome) {
                applied = Some(response);
            }
        }
        applied
    }

    /// Block until the latest background fetch finishes, then apply it.
    /// Returns `None` right away when the latest fetch is not in flight.
    pub fn wait(&mut self) -> Option<FetchResponse<R>> {
        let latest = self.latest?;
        let position = self.pending.iter().position(|(ticket, _)| *ticket == latest)?;
        let (ticket, receiver) = self.pending.remove(position);
        let outcome = receiver
            .recv()
            .unwrap_or_else(|_| Err(SourceFetchError::Disconnected));
        self.complete(ticket, outcome)
    }
}
