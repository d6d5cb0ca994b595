//! Resource Fetcher
//!
//! What fetch functions are given to work with: a scoped API handle, the
//! bounded delivery channel, and pagination helpers.

use super::multiplex::Scope;
use crate::provider::{ApiClient, FetchCancelled};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Scoped handle passed to fetch functions and post-resource resolvers.
#[derive(Clone)]
pub struct FetchContext {
    pub client: Arc<dyn ApiClient>,
    pub scope: Scope,
    pub cancel: CancellationToken,
}

impl FetchContext {
    pub fn new(client: Arc<dyn ApiClient>, scope: Scope, cancel: CancellationToken) -> Self {
        Self {
            client,
            scope,
            cancel,
        }
    }

    /// Call one operation under this scope.
    ///
    /// The response is deserialized into `O`; a response of the wrong shape
    /// is an error, as is cancellation while the call is in flight.
    pub async fn call<I, O>(&self, service: &str, operation: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)
            .with_context(|| format!("Failed to encode {}.{} input", service, operation))?;

        tracing::debug!("call {}.{} [{}]", service, operation, self.scope);

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FetchCancelled.into()),
            response = self.client.call(&self.scope, service, operation, input) => response?,
        };

        serde_json::from_value(response)
            .with_context(|| format!("Unexpected {}.{} response shape", service, operation))
    }
}

/// Sending half of a fetch's delivery channel.
///
/// Sends suspend while the channel is full and give up with
/// [`FetchCancelled`] as soon as the run is cancelled.
pub struct ItemSender<T> {
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
    delivered: Arc<AtomicUsize>,
}

impl<T: Send> ItemSender<T> {
    pub async fn send(&self, item: T) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchCancelled.into()),
            sent = self.tx.send(item) => {
                sent.map_err(|_| anyhow::anyhow!("Item receiver dropped"))?;
                self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    pub async fn send_all(&self, items: impl IntoIterator<Item = T>) -> Result<()> {
        for item in items {
            self.send(item).await?;
        }
        Ok(())
    }

    /// Items delivered so far through this sender
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Create a bounded delivery channel.
///
/// The returned counter tracks deliveries and outlives the sender.
pub fn item_channel<T>(
    capacity: usize,
    cancel: CancellationToken,
) -> (ItemSender<T>, mpsc::Receiver<T>, Arc<AtomicUsize>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let delivered = Arc::new(AtomicUsize::new(0));
    let sender = ItemSender {
        tx,
        cancel,
        delivered: Arc::clone(&delivered),
    };
    (sender, rx, delivered)
}

/// One page of a list operation
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<String>) -> Self {
        Self { items, next_token }
    }

    /// Continuation token, treating an empty string as absent
    fn continuation(&mut self) -> Option<String> {
        self.next_token.take().filter(|t| !t.is_empty())
    }
}

/// Counters of one paginated fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub pages: usize,
    pub items: usize,
    pub batches: usize,
}

/// Fetch all pages, emitting each page's items before requesting the next.
///
/// `fetch_page` receives the continuation token of the previous page (`None`
/// for the first call). The loop ends on the first page without a token.
pub async fn paginate<T, F, Fut>(tx: &ItemSender<T>, mut fetch_page: F) -> Result<PageStats>
where
    T: Send,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut stats = PageStats::default();
    let mut page_token: Option<String> = None;

    loop {
        let mut page = fetch_page(page_token.take()).await?;
        stats.pages += 1;
        let next = page.continuation();

        stats.items += page.items.len();
        tx.send_all(page.items).await?;

        match next {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    Ok(stats)
}

/// Fetch all pages, enriching items in windows of `batch_size` before they
/// are emitted.
///
/// The window carries across page boundaries, so `M` items cost exactly
/// `ceil(M / batch_size)` calls to `enrich`. Every item of a window is
/// enriched before any of them is sent.
pub async fn paginate_batched<T, U, F, Fut, E, EFut>(
    tx: &ItemSender<U>,
    batch_size: usize,
    mut fetch_page: F,
    mut enrich: E,
) -> Result<PageStats>
where
    U: Send,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    E: FnMut(Vec<T>) -> EFut,
    EFut: Future<Output = Result<Vec<U>>>,
{
    let batch_size = batch_size.max(1);
    let mut stats = PageStats::default();
    let mut window: Vec<T> = Vec::with_capacity(batch_size);
    let mut page_token: Option<String> = None;

    loop {
        let mut page = fetch_page(page_token.take()).await?;
        stats.pages += 1;
        let next = page.continuation();

        for item in page.items {
            window.push(item);
            if window.len() == batch_size {
                let batch = std::mem::replace(&mut window, Vec::with_capacity(batch_size));
                stats.batches += 1;
                let enriched = enrich(batch).await?;
                stats.items += enriched.len();
                tx.send_all(enriched).await?;
            }
        }

        match next {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    if !window.is_empty() {
        stats.batches += 1;
        let enriched = enrich(window).await?;
        stats.items += enriched.len();
        tx.send_all(enriched).await?;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn pages(sizes: &[usize]) -> VecDeque<Page<usize>> {
        let mut next = 0;
        sizes
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let items = (next..next + size).collect();
                next += size;
                let token = (i + 1 < sizes.len()).then(|| format!("page-{}", i + 1));
                Page::new(items, token)
            })
            .collect()
    }

    async fn drain(mut rx: mpsc::Receiver<usize>) -> Vec<usize> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_paginate_emits_every_page_in_order() {
        let (tx, rx, delivered) = item_channel(4, CancellationToken::new());
        let mut script = pages(&[3, 3, 1]);
        let mut tokens = Vec::new();

        let producer = async {
            let stats = paginate(&tx, |token| {
                tokens.push(token);
                let page = script.pop_front().unwrap();
                async move { Ok(page) }
            })
            .await;
            drop(tx);
            stats
        };
        let (stats, items) = tokio::join!(producer, drain(rx));

        let stats = stats.unwrap();
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.items, 7);
        assert_eq!(items, (0..7).collect::<Vec<_>>());
        assert_eq!(delivered.load(Ordering::Relaxed), 7);
        assert_eq!(
            tokens,
            vec![None, Some("page-1".to_string()), Some("page-2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_token_ends_pagination() {
        let (tx, rx, _) = item_channel(4, CancellationToken::new());
        let mut calls = 0;
        let producer = async {
            let stats = paginate(&tx, |_| {
                calls += 1;
                async { Ok(Page::new(vec![1usize], Some(String::new()))) }
            })
            .await;
            drop(tx);
            stats
        };
        let (stats, items) = tokio::join!(producer, drain(rx));
        assert_eq!(stats.unwrap().pages, 1);
        assert_eq!(items, vec![1]);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_batched_window_spans_pages() {
        let (tx, rx, _) = item_channel(8, CancellationToken::new());
        let mut script = pages(&[20, 20, 5]);
        let mut batch_sizes = Vec::new();

        let producer = async {
            let stats = paginate_batched(
                &tx,
                20,
                |_| {
                    let page = script.pop_front().unwrap();
                    async move { Ok(page) }
                },
                |batch: Vec<usize>| {
                    batch_sizes.push(batch.len());
                    async move { Ok(batch.into_iter().map(|i| i * 10).collect()) }
                },
            )
            .await;
            drop(tx);
            stats
        };
        let (stats, items) = tokio::join!(producer, drain(rx));

        let stats = stats.unwrap();
        assert_eq!(stats.batches, 3);
        assert_eq!(stats.items, 45);
        assert_eq!(batch_sizes, vec![20, 20, 5]);
        assert_eq!(items.len(), 45);
        assert_eq!(items[44], 440);
    }

    #[tokio::test]
    async fn test_send_observes_cancellation() {
        let cancel = CancellationToken::new();
        let (tx, _rx, _) = item_channel::<u8>(1, cancel.clone());
        tx.send(1).await.unwrap();

        // Channel is full; cancelling must unblock the pending send.
        cancel.cancel();
        let err = tx.send(2).await.unwrap_err();
        assert!(err.is::<FetchCancelled>());
        assert_eq!(tx.delivered(), 1);
    }
}
