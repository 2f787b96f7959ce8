//! Per-target client cache with idle eviction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::proxy::ProxyError;
use crate::upstream::{RouteKind, UpstreamTarget};

use super::factory::{ClientFactory, UpstreamClient};

struct CachedClient {
    client: UpstreamClient,
    last_used_at: Instant,
}

/// Maps `host:port` to a long-lived upstream client.
pub struct ClientCache {
    clients: DashMap<String, CachedClient>,
    factory: Arc<dyn ClientFactory>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients: DashMap::new(),
            factory,
        }
    }

    /// Return the client for `target`, building it on first use.
    ///
    /// Construction happens under the entry's shard lock, so concurrent first
    /// lookups of one target build exactly one client. Every lookup refreshes
    /// the entry's last-used time. Routes that reach the same `host:port`
    /// share whichever client was built first.
    pub fn get(&self, target: &UpstreamTarget, route: RouteKind) -> Result<UpstreamClient, ProxyError> {
        let now = Instant::now();
        let key = target.key();

        let (client, created) = match self.clients.entry(key) {
            Entry::Occupied(mut entry) => {
                let cached = entry.get_mut();
                cached.last_used_at = now;
                let cached_protocol = cached.client.target().protocol();
                if cached_protocol != target.protocol() {
                    tracing::warn!(
                        upstream = %target,
                        cached = ?cached_protocol,
                        requested = ?target.protocol(),
                        "Reusing upstream client built for another protocol"
                    );
                }
                (cached.client.clone(), false)
            }
            Entry::Vacant(entry) => {
                let client = self.factory.build(target, route)?;
                entry.insert(CachedClient {
                    client: client.clone(),
                    last_used_at: now,
                });
                (client, true)
            }
        };

        if created {
            tracing::debug!(upstream = %target, "Cached new upstream client");
            metrics::record_client_created(&target.key());
            metrics::record_cache_size(self.clients.len());
        }
        Ok(client)
    }

    /// Drop every client unused for longer than `threshold`. Handles already
    /// given out stay valid.
    pub fn evict_idle(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;

        self.clients.retain(|key, cached| {
            let idle = now.duration_since(cached.last_used_at);
            if idle > threshold {
                tracing::debug!(upstream = %key, idle_secs = idle.as_secs(), "Evicting idle client");
                evicted += 1;
                false
            } else {
                true
            }
        });

        metrics::record_cache_size(self.clients.len());
        if evicted > 0 {
            metrics::record_cache_evictions(evicted);
        }
        evicted
    }

    pub fn contains(&self, target: &UpstreamTarget) -> bool {
        self.clients.contains_key(&target.key())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tower::service_fn;
    use tower::util::BoxCloneSyncService;

    use ::metrics::with_local_recorder;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

    use crate::upstream::Protocol;

    /// Counts constructions; its clients answer every call with 200.
    #[derive(Default)]
    pub(crate) struct CountingFactory {
        pub(crate) built: AtomicUsize,
    }

    impl ClientFactory for CountingFactory {
        fn build(&self, target: &UpstreamTarget, _route: RouteKind) -> Result<UpstreamClient, ProxyError> {
            self.built.fetch_add(1, Ordering::SeqCst);
            // Widen the window for racing first lookups.
            std::thread::sleep(Duration::from_millis(5));
            let service = service_fn(|_req: reqwest::Request| async {
                let response = axum::http::Response::builder()
                    .status(200)
                    .body(String::from("ok"))
                    .unwrap();
                Ok::<_, ProxyError>(reqwest::Response::from(response))
            });
            Ok(UpstreamClient::new(
                target.clone(),
                BoxCloneSyncService::new(service),
                None,
            ))
        }
    }

    fn pod(host: &str) -> UpstreamTarget {
        UpstreamTarget::new(host, 9100, Protocol::H1C)
    }

    fn cache_size_gauge(snapshotter: &Snapshotter) -> Option<DebugValue> {
        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(key, _, _, _)| key.key().name() == metrics::CLIENT_CACHE_SIZE)
            .map(|(_, _, _, value)| value)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_lookups_build_one_client() {
        let factory = Arc::new(CountingFactory::default());
        let cache = Arc::new(ClientCache::new(factory.clone()));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get(&pod("10.1.2.3"), RouteKind::PodMetrics).unwrap() })
            })
            .collect();

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }

        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
        assert!(clients.iter().all(|c| c.ptr_eq(&clients[0])));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_only_idle_clients() {
        let factory = Arc::new(CountingFactory::default());
        let cache = ClientCache::new(factory.clone());

        cache.get(&pod("10.0.0.1"), RouteKind::PodMetrics).unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;
        cache.get(&pod("10.0.0.2"), RouteKind::PodMetrics).unwrap();
        tokio::time::advance(Duration::from_secs(150)).await;

        assert_eq!(cache.evict_idle(Duration::from_secs(300)), 1);
        assert!(!cache.contains(&pod("10.0.0.1")));
        assert!(cache.contains(&pod("10.0.0.2")));
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_refresh_last_used() {
        let factory = Arc::new(CountingFactory::default());
        let cache = ClientCache::new(factory.clone());

        cache.get(&pod("10.0.0.1"), RouteKind::PodMetrics).unwrap();
        tokio::time::advance(Duration::from_secs(250)).await;
        cache.get(&pod("10.0.0.1"), RouteKind::PodMetrics).unwrap();
        tokio::time::advance(Duration::from_secs(250)).await;

        assert_eq!(cache.evict_idle(Duration::from_secs(300)), 0);
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_handle_keeps_working() {
        let factory = Arc::new(CountingFactory::default());
        let cache = ClientCache::new(factory.clone());

        let client = cache.get(&pod("10.0.0.1"), RouteKind::PodMetrics).unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.evict_idle(Duration::from_secs(300)), 1);
        assert!(cache.is_empty());

        let response = client
            .get("/metrics", Default::default(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        cache.get(&pod("10.0.0.1"), RouteKind::PodMetrics).unwrap();
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_size_gauge_tracks_entries() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let cache = ClientCache::new(Arc::new(CountingFactory::default()));

        with_local_recorder(&recorder, || {
            cache.get(&pod("10.0.0.1"), RouteKind::PodMetrics).unwrap();
            cache.get(&pod("10.0.0.2"), RouteKind::PodMetrics).unwrap();
        });
        assert_eq!(cache_size_gauge(&snapshotter), Some(DebugValue::Gauge(2.0_f64.into())));

        tokio::time::advance(Duration::from_secs(301)).await;
        with_local_recorder(&recorder, || {
            assert_eq!(cache.evict_idle(Duration::from_secs(300)), 2);
        });
        assert_eq!(cache_size_gauge(&snapshotter), Some(DebugValue::Gauge(0.0_f64.into())));
    }

    #[tokio::test]
    async fn routes_to_one_endpoint_share_the_first_client() {
        let factory = Arc::new(CountingFactory::default());
        let cache = ClientCache::new(factory.clone());

        let pod_client = cache.get(&pod("10.0.0.1"), RouteKind::PodMetrics).unwrap();
        let api_target = UpstreamTarget::new("10.0.0.1", 9100, Protocol::H2);
        let api_client = cache.get(&api_target, RouteKind::ApiServerMetrics).unwrap();

        assert!(api_client.ptr_eq(&pod_client));
        assert_eq!(api_client.target().protocol(), Protocol::H1C);
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }
}
