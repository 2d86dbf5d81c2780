//! Scripted network collaborator for unit tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use url::Url;

use crate::error::FetchError;
use crate::net::{ByteRange, Fetcher};

/// Holds fetches of a URL until opened.
#[derive(Clone)]
pub(crate) struct Gate {
    open: std::sync::Arc<watch::Sender<bool>>,
}

impl Gate {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            open: std::sync::Arc::new(tx),
        }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[derive(Default)]
struct Route {
    body: Option<Bytes>,
    failures: VecDeque<FetchError>,
    always_fail: Option<FetchError>,
    stall: bool,
    full_body: bool,
    gate: Option<Gate>,
    hits: usize,
}

/// In-memory fetcher: serves registered bodies, 404 for everything else.
#[derive(Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &[u8]) {
        self.routes.lock().entry(url.to_string()).or_default().body =
            Some(Bytes::copy_from_slice(body));
    }

    /// Fail the next `times` fetches of `url` with `error`.
    pub fn fail_times(&self, url: &str, error: FetchError, times: usize) {
        let mut routes = self.routes.lock();
        let route = routes.entry(url.to_string()).or_default();
        route.failures.extend(std::iter::repeat(error).take(times));
    }

    pub fn fail_always(&self, url: &str, error: FetchError) {
        self.routes.lock().entry(url.to_string()).or_default().always_fail = Some(error);
    }

    /// Never answer fetches of `url`.
    pub fn stall(&self, url: &str) {
        self.routes.lock().entry(url.to_string()).or_default().stall = true;
    }

    /// Answer ranged fetches of `url` with the whole body, like a server
    /// without `Range` support.
    pub fn ignore_ranges(&self, url: &str) {
        self.routes.lock().entry(url.to_string()).or_default().full_body = true;
    }

    /// Hold fetches of `url` until the returned gate is opened.
    pub fn block(&self, url: &str) -> Gate {
        let gate = Gate::new();
        self.routes.lock().entry(url.to_string()).or_default().gate = Some(gate.clone());
        gate
    }

    pub fn hits(&self, url: &str) -> usize {
        self.routes.lock().get(url).map(|r| r.hits).unwrap_or(0)
    }

    /// Serve a VOD media playlist at `url` with `count` segments named
    /// `seg<i>.ts` next to it, each body being `segment-<i>`.
    pub fn serve_vod(&self, url: &str, count: usize) -> Vec<String> {
        let base = Url::parse(url).unwrap();
        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n");
        let mut segment_urls = Vec::with_capacity(count);
        for i in 0..count {
            playlist.push_str(&format!("#EXTINF:4.0,\nseg{}.ts\n", i));
            let seg = base.join(&format!("seg{}.ts", i)).unwrap().to_string();
            self.serve(&seg, format!("segment-{}", i).as_bytes());
            segment_urls.push(seg);
        }
        playlist.push_str("#EXT-X-ENDLIST\n");
        self.serve(url, playlist.as_bytes());
        segment_urls
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url, range: Option<ByteRange>) -> Result<Bytes, FetchError> {
        let (result, stall, full_body, gate) = {
            let mut routes = self.routes.lock();
            let route = routes.entry(url.to_string()).or_default();
            route.hits += 1;

            let result = if let Some(error) = route.failures.pop_front() {
                Err(error)
            } else if let Some(error) = &route.always_fail {
                Err(error.clone())
            } else {
                route.body.clone().ok_or(FetchError::Status(404))
            };
            (result, route.stall, route.full_body, route.gate.clone())
        };

        if stall {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = gate {
            gate.wait().await;
        }

        let body = result?;
        Ok(match range {
            Some(_) if full_body => body,
            Some(r) => {
                let start = (r.offset as usize).min(body.len());
                let end = (r.end() as usize).min(body.len());
                body.slice(start..end)
            }
            None => body,
        })
    }
}
