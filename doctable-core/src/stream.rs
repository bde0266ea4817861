//! Pull-based streaming over query results.
//!
//! A [`RecordStream`] wraps a store cursor as a lazy, finite, single-pass
//! [`Stream`](futures::Stream) of records. Nothing consumes the cursor ahead of the caller:
//! each `next().await` advances it, and the backend fetches further batches only when the
//! current one is exhausted.
//!
//! Dropping the stream, or calling [`RecordStream::cancel`], releases the cursor together with
//! any server-side resources it holds. A cancelled stream yields nothing further.
//!
//! ```ignore
//! use futures::TryStreamExt;
//!
//! let mut stream = table.read_stream(None).await?;
//! while let Some(record) = stream.try_next().await? {
//!     println!("{:?}", record);
//! }
//! ```

use futures::{Stream, StreamExt, stream::BoxStream};
use std::{
    error::Error as StdError,
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    document::Record,
    error::{TableError, TableResult},
};

pub struct RecordStream {
    cursor: Option<BoxStream<'static, TableResult<Record>>>,
    yielded: usize,
}

impl RecordStream {
    /// Wraps a stream that already speaks this crate's item type.
    pub fn new<S>(cursor: S) -> Self
    where
        S: Stream<Item = TableResult<Record>> + Send + 'static,
    {
        Self { cursor: Some(cursor.boxed()), yielded: 0 }
    }

    /// Wraps an arbitrary cursor, such as a raw driver cursor from a custom query.
    ///
    /// Items convert into [`Record`]; errors surface as [`TableError::Backend`] at the point
    /// of consumption.
    pub fn from_cursor<S, T, E>(cursor: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Into<Record>,
        E: StdError + Send + Sync + 'static,
    {
        Self::new(cursor.map(|item| {
            item.map(Into::into)
                .map_err(|e| TableError::Backend(e.to_string()))
        }))
    }

    /// A stream that yields nothing.
    pub fn empty() -> Self {
        Self { cursor: None, yielded: 0 }
    }

    /// Stops the stream and releases the underlying cursor.
    pub fn cancel(&mut self) {
        self.cursor = None;
    }

    /// Consumes the stream, releasing the underlying cursor.
    pub fn close(mut self) {
        self.cancel();
    }

    /// Returns `true` once the stream is exhausted or cancelled.
    pub fn is_terminated(&self) -> bool {
        self.cursor.is_none()
    }

    /// Number of items yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }
}

impl Stream for RecordStream {
    type Item = TableResult<Record>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(cursor) = this.cursor.as_mut() else {
            return Poll::Ready(None);
        };

        match cursor.poll_next_unpin(cx) {
            Poll::Ready(Some(item)) => {
                this.yielded += 1;
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                // Exhausted: drop the cursor now rather than when the stream is dropped.
                this.cursor = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.cursor {
            Some(cursor) => cursor.size_hint(),
            None => (0, Some(0)),
        }
    }
}

impl fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("terminated", &self.is_terminated())
            .field("yielded", &self.yielded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{Document, doc};
    use futures::{TryStreamExt, stream};
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    fn numbered(n: i32) -> Vec<Result<Document, io::Error>> {
        (0..n).map(|i| Ok(doc! { "_id": i })).collect()
    }

    #[tokio::test]
    async fn yields_every_item_once() {
        let records = RecordStream::from_cursor(stream::iter(numbered(5)))
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records[4].primary_id(), Some(&bson::Bson::Int32(4)));
    }

    #[tokio::test]
    async fn is_pulled_lazily() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let cursor = stream::iter(numbered(10)).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut records = RecordStream::from_cursor(cursor);
        records.next().await.unwrap().unwrap();
        records.next().await.unwrap().unwrap();

        assert_eq!(pulled.load(Ordering::SeqCst), 2);
        assert_eq!(records.yielded(), 2);
    }

    #[tokio::test]
    async fn cancelled_stream_yields_nothing_further() {
        let mut records = RecordStream::from_cursor(stream::iter(numbered(3)));
        assert!(records.next().await.is_some());

        records.cancel();

        assert!(records.is_terminated());
        assert!(records.next().await.is_none());
        assert_eq!(records.yielded(), 1);
    }

    #[tokio::test]
    async fn cursor_errors_surface_at_consumption() {
        let cursor = stream::iter(vec![
            Ok(doc! { "_id": 1 }),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection lost")),
        ]);
        let mut records = RecordStream::from_cursor(cursor);

        assert!(records.next().await.unwrap().is_ok());
        assert!(matches!(records.next().await, Some(Err(TableError::Backend(_)))));
    }
}
