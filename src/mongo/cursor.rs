//! Byte-bounded cursor draining.
//!
//! Query results are pulled one document at a time from a server-side
//! cursor and collected until the response would exceed a byte ceiling.
//!
//! The stopping rule is conservative. Before every fetch the drain checks
//! whether `cumulative + largest_so_far` already reaches the ceiling, using
//! the largest admitted document as a stand-in for the next one; this keeps
//! a single fetch from pulling a huge document into memory only for it to
//! be discarded. After a fetch the exact size decides admission.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// A source of results that can be pulled one element at a time.
#[async_trait]
pub trait CursorSource<T: Send>: Send {
    /// Fetches the next element, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails while fetching.
    async fn try_next(&mut self) -> Result<Option<T>, BackendError>;
}

/// An in-memory cursor over already materialised results.
#[derive(Debug, Clone)]
pub struct VecCursor<T> {
    items: std::collections::VecDeque<T>,
    fetched: usize,
}

impl<T> VecCursor<T> {
    /// Creates a cursor yielding `items` in order.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
            fetched: 0,
        }
    }

    /// Returns how many elements have been handed out so far.
    #[must_use]
    pub const fn fetched(&self) -> usize {
        self.fetched
    }
}

#[async_trait]
impl<T: Send> CursorSource<T> for VecCursor<T> {
    async fn try_next(&mut self) -> Result<Option<T>, BackendError> {
        let next = self.items.pop_front();
        if next.is_some() {
            self.fetched += 1;
        }
        Ok(next)
    }
}

/// Drains `cursor` until it is exhausted, the byte ceiling would be reached,
/// or `cancel` fires.
///
/// A `max_bytes` of zero or less disables the ceiling. `measure` returns the
/// encoded size of an element. Reaching the ceiling or being cancelled is not
/// an error: the elements admitted so far are returned in retrieval order.
///
/// # Errors
///
/// Returns an error if fetching from the cursor or measuring an element fails.
pub async fn drain_until_max_bytes<T, F>(
    cursor: &mut (dyn CursorSource<T> + '_),
    max_bytes: i64,
    cancel: &CancellationToken,
    mut measure: F,
) -> Result<Vec<T>, BackendError>
where
    T: Send,
    F: FnMut(&T) -> Result<u64, BackendError>,
{
    let ceiling = u64::try_from(max_bytes).ok().filter(|ceiling| *ceiling > 0);
    let mut admitted = Vec::new();
    let mut cumulative: u64 = 0;
    let mut largest: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        if ceiling.is_some_and(|ceiling| cumulative + largest >= ceiling) {
            break;
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = cursor.try_next() => next?,
        };
        let Some(item) = next else {
            break;
        };

        if let Some(ceiling) = ceiling {
            let size = measure(&item)?;
            if cumulative + size >= ceiling {
                break;
            }
            cumulative += size;
            largest = largest.max(size);
        }
        admitted.push(item);
    }

    Ok(admitted)
}

/// Encoded BSON size of a document.
///
/// # Errors
///
/// Returns an error if the document cannot be encoded.
pub fn bson_size(document: &bson::Document) -> Result<u64, BackendError> {
    let bytes = bson::to_vec(document)?;
    Ok(bytes.len() as u64)
}
