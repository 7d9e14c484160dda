//! Relay-style cursor pagination.

use std::future::Future;

use serde::Deserialize;
use tracing::warn;

use super::error::Cause;

/// `pageInfo { endCursor hasNextPage }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    #[serde(default)]
    pub(crate) end_cursor: Option<String>,
    #[serde(default)]
    pub(crate) has_next_page: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Edge<N> {
    pub(crate) node: N,
}

/// One page of a connection: `{ pageInfo edges { node } }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Connection<N> {
    #[serde(default)]
    pub(crate) page_info: PageInfo,
    #[serde(default = "Vec::new")]
    pub(crate) edges: Vec<Edge<N>>,
}

impl<N> Default for Connection<N> {
    fn default() -> Self {
        Self {
            page_info: PageInfo::default(),
            edges: Vec::new(),
        }
    }
}

impl<N> Connection<N> {
    pub(crate) fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Follow `hasNextPage`, appending each page's edges to this one.
    ///
    /// `next` receives the cursor of the last page fetched and returns the
    /// following page. A follow-up page without edges ends the list.
    pub(crate) async fn fetch_pages<F, Fut>(mut self, mut next: F) -> Result<Self, Cause>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Connection<N>, Cause>>,
    {
        let mut page_info = self.page_info.clone();

        while page_info.has_next_page {
            let Some(cursor) = page_info.end_cursor.take() else {
                warn!("page reports more results but carries no cursor, stopping");
                break;
            };

            let page = next(cursor).await?;
            if page.is_empty() {
                warn!("page reports more results but the next page is empty, stopping");
                page_info = PageInfo::default();
                break;
            }

            page_info = page.page_info;
            self.edges.extend(page.edges);
        }

        self.page_info = page_info;
        Ok(self)
    }

    pub(crate) fn into_nodes(self) -> Vec<N> {
        self.edges.into_iter().map(|edge| edge.node).collect()
    }
}
