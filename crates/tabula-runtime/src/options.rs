#![forbid(unsafe_code)]

//! Runtime options for a [`Table`](crate::table::Table).

use tabula_model::PipelineOptions;

/// How state writes reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    /// Write on the dispatching thread after every change.
    #[default]
    Sync,
    /// Hand writes to a [`BackgroundWriter`](crate::writer::BackgroundWriter).
    Background,
}

/// Switches for server-side data and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableOptions {
    pub manual_pagination: bool,
    pub manual_sorting: bool,
    pub manual_filtering: bool,
    /// Total row count under manual pagination. Updated from fetch responses.
    pub row_count: Option<usize>,
    pub persistence: PersistenceMode,
    /// Run data source fetches on a worker thread instead of inline.
    pub background_fetch: bool,
}

impl TableOptions {
    /// Every stage handled by the server.
    #[must_use]
    pub fn server() -> Self {
        Self {
            manual_pagination: true,
            manual_sorting: true,
            manual_filtering: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn manual_pagination(mut self, enabled: bool) -> Self {
        self.manual_pagination = enabled;
        self
    }

    #[must_use]
    pub fn manual_sorting(mut self, enabled: bool) -> Self {
        self.manual_sorting = enabled;
        self
    }

    #[must_use]
    pub fn manual_filtering(mut self, enabled: bool) -> Self {
        self.manual_filtering = enabled;
        self
    }

    #[must_use]
    pub fn row_count(mut self, total: usize) -> Self {
        self.row_count = Some(total);
        self
    }

    #[must_use]
    pub fn persistence(mut self, mode: PersistenceMode) -> Self {
        self.persistence = mode;
        self
    }

    #[must_use]
    pub fn background_fetch(mut self, enabled: bool) -> Self {
        self.background_fetch = enabled;
        self
    }

    /// Whether any stage is delegated to the caller.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.manual_pagination || self.manual_sorting || self.manual_filtering
    }

    pub(crate) fn pipeline(&self) -> PipelineOptions {
        PipelineOptions {
            manual_filtering: self.manual_filtering,
            manual_sorting: self.manual_sorting,
            manual_pagination: self.manual_pagination,
            row_count: self.row_count,
        }
    }
}
