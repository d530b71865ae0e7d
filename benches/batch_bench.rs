// Benchmarks for codec dispatch and batch scheduling
// Run with: cargo bench

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use http::{Method, StatusCode};
use riak_cache::transport::{Transport, TransportRequest, TransportResponse};
use riak_cache::{BatchStrategy, Client, CodecRegistry, Result};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory store answering the key paths the client issues
struct MemoryTransport {
    objects: Mutex<HashMap<String, Bytes>>,
    latency: Duration,
}

impl MemoryTransport {
    fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(HashMap::new()),
            latency,
        })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn base_url(&self) -> &str {
        "http://bench.local"
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}

    async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut objects = self.objects.lock().unwrap();
        let response = match request.method {
            Method::GET => match objects.get(&request.path) {
                Some(data) => TransportResponse::new(StatusCode::OK, data.clone()),
                None => TransportResponse::new(StatusCode::NOT_FOUND, Bytes::new()),
            },
            Method::POST => {
                objects.insert(request.path, request.body.unwrap_or_default());
                TransportResponse::new(StatusCode::NO_CONTENT, Bytes::new())
            }
            Method::DELETE => {
                objects.remove(&request.path);
                TransportResponse::new(StatusCode::NO_CONTENT, Bytes::new())
            }
            _ => TransportResponse::new(StatusCode::BAD_REQUEST, Bytes::new()),
        };
        Ok(response)
    }
}

/// Benchmark codec dispatch for registered and fallback content types
fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let registry = CodecRegistry::new();
    let document = json!({
        "user": "alice",
        "roles": ["admin", "ops"],
        "visits": 1024,
        "active": true,
    });
    let encoded = registry.encode(&document, "application/json").unwrap();

    group.bench_function("encode_json", |b| {
        b.iter(|| registry.encode(black_box(&document), "application/json").unwrap())
    });
    group.bench_function("decode_json", |b| {
        b.iter(|| registry.decode(black_box(&encoded), "Application/JSON; charset=utf-8").unwrap())
    });

    let text = json!("x".repeat(4096));
    group.bench_function("encode_text_fallback", |b| {
        b.iter(|| registry.encode(black_box(&text), "text/plain").unwrap())
    });
    group.finish();
}

/// Benchmark batch reads under each scheduling strategy
fn bench_get_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_many");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(20);

    let rt = tokio::runtime::Runtime::new().unwrap();
    let transport = MemoryTransport::new(Duration::from_millis(1));
    let base = Client::with_transport("bench", transport);

    let keys: Vec<String> = (0..256).map(|i| format!("key_{:05}", i)).collect();
    rt.block_on(async {
        let writes = keys.iter().map(|k| (k.clone(), format!("value for {}", k)));
        base.clone()
            .with_batch_strategy(BatchStrategy::Unbounded)
            .set_many(writes)
            .await;
    });

    let strategies = [
        ("sequential", BatchStrategy::Sequential),
        ("bounded_16", BatchStrategy::Bounded(16)),
        ("bounded_64", BatchStrategy::Bounded(64)),
        ("unbounded", BatchStrategy::Unbounded),
    ];

    for size in [16usize, 256] {
        group.throughput(Throughput::Elements(size as u64));
        for (name, strategy) in strategies {
            if strategy == BatchStrategy::Sequential && size > 16 {
                continue;
            }
            let client = base.clone().with_batch_strategy(strategy);
            let batch = keys[..size].to_vec();
            group.bench_with_input(BenchmarkId::new(name, size), &batch, |b, batch| {
                b.to_async(&rt).iter(|| async {
                    let outcome = client.get_many(batch.iter().cloned()).await;
                    black_box(outcome.len())
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_get_many);
criterion_main!(benches);
