//! Following continuation tokens across pages.

use std::collections::HashSet;
use std::future::Future;

use async_stream::try_stream;
use futures::Stream;
use tracing::debug;

use crate::client::CatalogApi;
use crate::error::CatalogClientError;
use crate::types::{
    DiffEntry,
    DiffParams,
    EntriesParams,
    EntryItem,
    ListReferencesParams,
    LogEntry,
    LogParams,
    Page,
    Reference,
};

/// Stream all references matching `params`, requesting pages as needed.
///
/// `params.page_token` is used for the first request,
/// following requests use the token returned by the previous page.
pub fn reference_stream<'a, C: CatalogApi>(
    client: &'a C,
    params: ListReferencesParams,
) -> impl Stream<Item = Result<Reference, CatalogClientError>> + 'a {
    let first_token = params.page_token.clone();
    make_token_stream(
        move |token| {
            let params = ListReferencesParams {
                page_token: token,
                ..params.clone()
            };
            async move { client.list_references(&params).await }
        },
        first_token,
    )
}

/// Stream all differences between two references.
pub fn diff_stream<'a, C: CatalogApi>(
    client: &'a C,
    from_ref: &'a str,
    to_ref: &'a str,
    params: DiffParams,
) -> impl Stream<Item = Result<DiffEntry, CatalogClientError>> + 'a {
    let first_token = params.page_token.clone();
    make_token_stream(
        move |token| {
            let params = DiffParams {
                page_token: token,
                ..params.clone()
            };
            async move { client.diff(from_ref, to_ref, &params).await }
        },
        first_token,
    )
}

/// Stream all keys stored on a reference.
pub fn entries_stream<'a, C: CatalogApi>(
    client: &'a C,
    reference: &'a str,
    params: EntriesParams,
) -> impl Stream<Item = Result<EntryItem, CatalogClientError>> + 'a {
    let first_token = params.page_token.clone();
    make_token_stream(
        move |token| {
            let params = EntriesParams {
                page_token: token,
                ..params.clone()
            };
            async move { client.list_entries(reference, &params).await }
        },
        first_token,
    )
}

/// Stream the commit log of a reference, newest first.
///
/// Pages are only requested as the stream is polled,
/// so taking a prefix of a long history is cheap.
pub fn log_stream<'a, C: CatalogApi>(
    client: &'a C,
    reference: &'a str,
    params: LogParams,
) -> impl Stream<Item = Result<LogEntry, CatalogClientError>> + 'a {
    let first_token = params.page_token.clone();
    make_token_stream(
        move |token| {
            let params = LogParams {
                page_token: token,
                ..params.clone()
            };
            async move { client.commit_log(reference, &params).await }
        },
        first_token,
    )
}

/// Yield the items of consecutive pages until a page comes without a token.
///
/// A token seen before means the service is cycling through pages,
/// which is reported as an unexpected response.
fn make_token_stream<T, Fut>(
    generator: impl Fn(Option<String>) -> Fut,
    first_token: Option<String>,
) -> impl Stream<Item = Result<T, CatalogClientError>>
where
    Fut: Future<Output = Result<Page<T>, CatalogClientError>>,
{
    try_stream! {
        let mut seen = first_token.iter().cloned().collect::<HashSet<String>>();
        let mut token = first_token;
        let mut n_pages = 0_usize;

        loop {
            let page = generator(token.clone()).await?;
            n_pages += 1;

            let next = page.token;
            for item in page.items {
                yield item;
            }

            match next {
                None => break,
                Some(next) if !seen.insert(next.clone()) => {
                    Err::<(), _>(CatalogClientError::UnexpectedResponse(format!(
                        "page {n_pages} returned the already seen continuation token '{next}'"
                    )))?;
                },
                Some(next) => token = Some(next),
            }
        }

        debug!(n_pages, "finished paging");
    }
}
