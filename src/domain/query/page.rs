//! Pages of an infinite listing and the cursor that links them

use serde::{Deserialize, Serialize};

/// Opaque cursor marking where the next page fetch resumes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PageToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Items that can anchor the cursor of the following page
pub trait Paginated {
    fn page_token(&self) -> PageToken;
}

/// One fetched page and the token used to fetch it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` for the first page
    pub token: Option<PageToken>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, token: Option<PageToken>) -> Self {
        Self { items, token }
    }
}

/// Pages of an infinite listing, in fetch order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pages: Vec<Page<T>>,
}

impl<T> PagedResult<T> {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    pub fn pages(&self) -> &[Page<T>] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Appends a page after all earlier pages
    pub fn push(&mut self, page: Page<T>) {
        self.pages.push(page);
    }

    /// All items across pages, in order
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }
}

impl<T: Paginated> PagedResult<T> {
    /// Token for the page after the last one
    ///
    /// An empty last page means there is nothing further, even when earlier
    /// pages had items. With no pages at all there is no token either; use
    /// [`PagedResult::is_empty`] to tell the two apart.
    pub fn next_token(&self) -> Option<PageToken> {
        self.pages
            .last()
            .and_then(|page| page.items.last())
            .map(Paginated::page_token)
    }

    pub fn has_next_page(&self) -> bool {
        self.next_token().is_some()
    }
}

impl<T> Default for PagedResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pagination state of one paged key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationState {
    Empty,
    Loading,
    /// Pages are loaded; `None` is terminal
    HasPages(Option<PageToken>),
}
