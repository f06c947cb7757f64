//! Paged listings and the folds over them.

use extstore_core::{Error, ListingFn, Result, S3Config, glob};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};

use crate::translate::{Operation, translate};
use crate::{BackendError, ListObjectsRequest, ListPage, S3Client};

/// A listing that can be walked page by page, any number of times.
///
/// Each call to [`pages`](Self::pages) starts again from the first page.
/// Pages are fetched only as the stream is polled: dropping it stops the
/// pagination.
#[derive(Debug, Clone)]
pub struct ListPages {
    client: S3Client,
    request: ListObjectsRequest,
}

impl ListPages {
    /// Lists with `request`, its continuation token ignored.
    pub fn new(client: S3Client, request: ListObjectsRequest) -> Self {
        let request = ListObjectsRequest {
            continuation_token: None,
            ..request
        };
        Self { client, request }
    }

    /// The bucket being listed.
    pub fn bucket(&self) -> &str {
        &self.request.bucket
    }

    /// Streams the pages in order. The stream ends after the first error.
    pub fn pages(&self) -> BoxStream<'static, Result<ListPage, BackendError>> {
        let client = self.client.clone();
        stream::try_unfold(Some(self.request.clone()), move |state| {
            let client = client.clone();
            async move {
                let Some(mut request) = state else {
                    return Ok::<_, BackendError>(None);
                };
                let page = client.list_objects(&request).await?;
                let next = page.next_continuation_token.clone().map(|token| {
                    request.continuation_token = Some(token);
                    request
                });
                Ok(Some((page, next)))
            }
        })
        .boxed()
    }
}

/// How matched keys are reported by [`collect_matches`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum MatchForm<'a> {
    /// Relative to the location prefix, which every match must start with.
    Relative { prefix: &'a str },
    /// As a full location URL rebuilt from the payload.
    Location { conf: &'a S3Config },
}

impl MatchForm<'_> {
    fn render(&self, key: &str) -> Result<String> {
        match self {
            Self::Relative { prefix } => {
                let Some(rest) = key.strip_prefix(prefix) else {
                    return Err(Error::invalid_pattern(format!(
                        "pattern matched file outside of path: {key}"
                    )));
                };
                Ok(rest.strip_prefix('/').unwrap_or(rest).to_owned())
            }
            Self::Location { conf } => Ok(conf.location_for(key)?.to_string()),
        }
    }
}

/// Collects every listed key matching `pattern`, in listing order.
///
/// A malformed pattern or a match outside the prefix stops the listing.
pub(crate) async fn collect_matches(
    listing: &ListPages,
    pattern: &str,
    form: MatchForm<'_>,
) -> Result<Vec<String>> {
    let mut pages = listing.pages();
    let mut matches = Vec::new();

    while let Some(page) = pages
        .try_next()
        .await
        .map_err(|err| translate(Operation::List, listing.bucket(), err))?
    {
        for key in &page.keys {
            let matched = glob::matches(pattern, key).map_err(|err| {
                Error::invalid_pattern(Operation::List.describe(listing.bucket())).with_source(err)
            })?;
            if matched {
                matches.push(form.render(key)?);
            }
        }
    }
    Ok(matches)
}

/// Visits the grouped prefixes and then the keys of every page, each with
/// `dest` stripped.
///
/// The first visitor error stops the listing and is returned unchanged.
pub(crate) async fn visit_entries(
    listing: &ListPages,
    dest: &str,
    visit: &mut ListingFn<'_>,
) -> Result<()> {
    let mut pages = listing.pages();

    while let Some(page) = pages
        .try_next()
        .await
        .map_err(|err| translate(Operation::List, listing.bucket(), err))?
    {
        for name in page.common_prefixes.iter().chain(&page.keys) {
            visit(name.strip_prefix(dest).unwrap_or(name))?;
        }
    }
    Ok(())
}
