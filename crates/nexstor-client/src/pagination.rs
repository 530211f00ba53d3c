//! Collection walker over offset-addressed slices
//!
//! The appliance serves collections in bounded slices of fewer than
//! [`MAX_PAGE_SIZE`] records. The walker stitches slices of [`PAGE_SIZE`]
//! together and stops at the first short slice. A full slice never proves
//! there is more data; the walker always fetches once more and checks.
//!
//! Windowed walks resume after a record key instead of an offset, because
//! offsets shift when the collection is modified between calls. Every window
//! re-walks from the first offset; no scan position is kept between calls.

use crate::error::{Error, Result};
use async_trait::async_trait;
use nexstor_common::Keyed;
use tracing::debug;

/// Page ceiling imposed by the appliance; requests must stay below it
pub const MAX_PAGE_SIZE: usize = 100;

/// Slice size used by the walker
pub const PAGE_SIZE: usize = MAX_PAGE_SIZE - 1;

/// Reject slice arguments the appliance would refuse
pub fn validate_slice_args(operation: &str, limit: usize) -> Result<()> {
    if limit == 0 || limit >= MAX_PAGE_SIZE {
        return Err(Error::invalid_argument(format!(
            "{operation}: parameter 'limit' must be greater than 0 and less than {MAX_PAGE_SIZE}, got: {limit}"
        )));
    }
    Ok(())
}

/// Source of bounded slices of one remote collection
#[async_trait]
pub trait SliceSource: Send + Sync {
    type Record: Keyed + Send;

    /// Offset of the first record of interest
    ///
    /// Filesystem listings place the parent itself at offset 0 and start at 1.
    const FIRST_OFFSET: usize = 0;

    /// Fetch up to `limit` records of `parent` starting at `offset`
    ///
    /// Implementations call [`validate_slice_args`] before sending anything.
    async fn fetch_slice(
        &self,
        parent: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Self::Record>>;
}

/// Records of one window and the key to resume after it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window<R> {
    pub items: Vec<R>,
    /// Key of the last item when the window filled up, otherwise empty
    pub next_token: String,
}

impl<R> Default for Window<R> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_token: String::new(),
        }
    }
}

/// Every record of `parent`, in appliance order
pub async fn get_all<S: SliceSource>(source: &S, parent: &str) -> Result<Vec<S::Record>> {
    get_all_with_page_size(source, parent, PAGE_SIZE).await
}

/// [`get_all`] with an explicit slice size below [`MAX_PAGE_SIZE`]
#[tracing::instrument(level = "debug", skip(source))]
pub async fn get_all_with_page_size<S: SliceSource>(
    source: &S,
    parent: &str,
    page_size: usize,
) -> Result<Vec<S::Record>> {
    validate_slice_args("get_all", page_size)?;
    let mut records = Vec::new();
    let mut offset = S::FIRST_OFFSET;
    loop {
        let page = source.fetch_slice(parent, page_size, offset).await?;
        let count = page.len();
        records.extend(page);
        offset += count;
        if count < page_size {
            break;
        }
    }
    debug!(count = records.len(), "collection walked");
    Ok(records)
}

/// Up to `limit` records following the one keyed `starting_token`
///
/// An empty token starts at the first record, a zero limit takes everything
/// that follows. A token that is no longer in the collection yields an empty
/// window rather than an error.
#[tracing::instrument(level = "debug", skip(source))]
pub async fn get_all_with_starting_token<S: SliceSource>(
    source: &S,
    parent: &str,
    starting_token: &str,
    limit: usize,
) -> Result<Window<S::Record>> {
    let mut window = Window::default();
    let mut found = starting_token.is_empty();
    let mut offset = S::FIRST_OFFSET;

    'walk: loop {
        let page = source.fetch_slice(parent, PAGE_SIZE, offset).await?;
        let count = page.len();
        for record in page {
            if found {
                window.items.push(record);
                if limit != 0 && window.items.len() == limit {
                    window.next_token = record_key(&window.items);
                    break 'walk;
                }
            } else if record.key() == starting_token {
                found = true;
            }
        }
        offset += count;
        if count < PAGE_SIZE {
            break;
        }
    }

    if !found {
        debug!("starting token not in collection, returning empty window");
    }
    Ok(window)
}

fn record_key<R: Keyed>(items: &[R]) -> String {
    items.last().map(|r| r.key().to_string()).unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Item(pub String);

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.0
        }
    }

    /// In-memory collection served in slices, with optional parent row
    pub struct MemorySource {
        pub records: Mutex<Vec<Item>>,
        pub calls: Mutex<Vec<(usize, usize)>>,
    }

    impl MemorySource {
        pub fn with_count(count: usize) -> Self {
            Self::new((0..count).map(|i| format!("pool/fs-{i:04}")).collect())
        }

        pub fn new(keys: Vec<String>) -> Self {
            Self {
                records: Mutex::new(keys.into_iter().map(Item).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SliceSource for MemorySource {
        type Record = Item;

        async fn fetch_slice(
            &self,
            _parent: &str,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<Item>> {
            validate_slice_args("MemorySource", limit)?;
            self.calls.lock().push((limit, offset));
            let records = self.records.lock();
            Ok(records.iter().skip(offset).take(limit).cloned().collect())
        }
    }

    pub fn keys(items: &[Item]) -> Vec<String> {
        items.iter().map(|i| i.0.clone()).collect()
    }
}
