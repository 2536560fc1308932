use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::FetchOptions;
use crate::http_client::{FetchError, PageFetcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest<K> {
    pub key: K,
    pub url: String,
}

impl<K> FetchRequest<K> {
    pub fn new(key: K, url: impl Into<String>) -> Self {
        Self {
            key,
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedPage<K> {
    pub key: K,
    pub url: String,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FetchFailure<K> {
    pub key: K,
    pub url: String,
    pub error: FetchError,
    pub attempts: u32,
}

// `pages` are in completion order.
#[derive(Debug, Clone)]
pub struct BatchOutcome<K> {
    pub pages: Vec<FetchedPage<K>>,
    pub failures: Vec<FetchFailure<K>>,
}

impl<K> Default for BatchOutcome<K> {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            failures: Vec::new(),
        }
    }
}

pub struct FetchPool {
    pool: Option<rayon::ThreadPool>,
    options: FetchOptions,
}

impl FetchPool {
    pub fn new(options: FetchOptions) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.parallelism.max(1))
            .thread_name(|idx| format!("harvest-fetch-{idx}"))
            .build()
            .ok();
        if pool.is_none() {
            warn!("fetch pool unavailable, falling back to the global pool");
        }
        Self { pool, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    pub fn install<T>(&self, action: impl FnOnce() -> T + Send) -> T
    where
        T: Send,
    {
        if let Some(pool) = self.pool.as_ref() {
            pool.install(action)
        } else {
            action()
        }
    }

    pub fn fetch_one<F>(&self, fetcher: &F, url: &str) -> Result<String, FetchError>
    where
        F: PageFetcher + ?Sized,
    {
        fetch_with_retry(fetcher, url, &self.options).0
    }

    pub fn fetch_all<K, F>(&self, fetcher: &F, requests: Vec<FetchRequest<K>>) -> BatchOutcome<K>
    where
        K: Send,
        F: PageFetcher + ?Sized,
    {
        let mut outcome = BatchOutcome::default();
        self.fetch_batch_into(fetcher, requests, &mut outcome);
        outcome
    }

    // Joins after every `chunk_size` requests.
    pub fn fetch_all_chunked<K, F>(
        &self,
        fetcher: &F,
        requests: Vec<FetchRequest<K>>,
        chunk_size: usize,
    ) -> BatchOutcome<K>
    where
        K: Send,
        F: PageFetcher + ?Sized,
    {
        let chunk_size = chunk_size.max(1);
        let mut outcome = BatchOutcome::default();
        let mut pending = requests.into_iter().peekable();
        while pending.peek().is_some() {
            let chunk = pending.by_ref().take(chunk_size).collect::<Vec<_>>();
            self.fetch_batch_into(fetcher, chunk, &mut outcome);
        }
        outcome
    }

    fn fetch_batch_into<K, F>(
        &self,
        fetcher: &F,
        requests: Vec<FetchRequest<K>>,
        outcome: &mut BatchOutcome<K>,
    ) where
        K: Send,
        F: PageFetcher + ?Sized,
    {
        if requests.is_empty() {
            return;
        }
        let options = &self.options;
        let (tx, rx) = mpsc::channel();
        self.install(|| {
            requests.into_par_iter().for_each_with(tx, |tx, request| {
                let (result, attempts) = fetch_with_retry(fetcher, &request.url, options);
                let _ = tx.send((request, result, attempts));
            });
        });

        // Every sender is gone once the batch has joined, so this drains in
        // the order the fetches finished.
        for (request, result, attempts) in rx {
            match result {
                Ok(body) => outcome.pages.push(FetchedPage {
                    key: request.key,
                    url: request.url,
                    body,
                }),
                Err(error) => {
                    warn!(url = %request.url, %error, attempts, "fetch failed");
                    outcome.failures.push(FetchFailure {
                        key: request.key,
                        url: request.url,
                        error,
                        attempts,
                    });
                }
            }
        }
    }
}

fn fetch_with_retry<F>(fetcher: &F, url: &str, options: &FetchOptions) -> (Result<String, FetchError>, u32)
where
    F: PageFetcher + ?Sized,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match fetcher.fetch(url) {
            Ok(body) => {
                debug!(url, attempts, bytes = body.len(), "fetched");
                return (Ok(body), attempts);
            }
            Err(err) if err.is_transient() && attempts <= options.retries => {
                let delay = backoff_delay(options.retry_backoff, attempts);
                debug!(url, %err, attempts, delay_ms = delay.as_millis() as u64, "retrying fetch");
                thread::sleep(delay);
            }
            Err(err) => return (Err(err), attempts),
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let exp = base_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(10));
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(exp.saturating_add(jitter))
}
