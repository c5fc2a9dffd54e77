//! Dispatch hot-path benchmarks
//!
//! Measures the non-I/O pieces every request touches: failure classification,
//! cache key derivation, fallback text selection and a cache-hit dispatch.
//!
//! Run with: `cargo bench`

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use keyrotor::{
    cache::ResponseCache,
    dispatch::{Dispatcher, SendOptions},
    fallback::FallbackResponder,
    pool::{CredentialPool, ModelRotation, catalog::default_catalog},
    upstream::{ChatMessage, Upstream, UpstreamError, UpstreamRequest, classify},
};
use secrecy::SecretString;
use std::hint::black_box;
use std::sync::Arc;

struct ImmediateUpstream;

#[async_trait]
impl Upstream for ImmediateUpstream {
    async fn complete(&self, _: UpstreamRequest<'_>) -> Result<String, UpstreamError> {
        Ok("benchmark answer".to_string())
    }
}

fn bench_classify(c: &mut Criterion) {
    let cases = [
        ("rate_limit_status", Some(429), "Too Many Requests"),
        ("keyword_in_400", Some(400), "Rate limit exceeded for this model"),
        ("auth", Some(401), "Invalid API key"),
        ("client_error", Some(400), "messages: field required"),
        ("network", None, "connection refused"),
    ];

    let mut group = c.benchmark_group("classify");
    for (name, status, message) in cases {
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &(status, message),
            |b, (status, message)| b.iter(|| classify(black_box(*status), black_box(message))),
        );
    }
    group.finish();
}

fn bench_cache_key(c: &mut Criterion) {
    let cache = ResponseCache::default();
    let system_prompt = "You are a helpful assistant for a short-term rental platform. \
        Answer briefly and politely.";
    let short = vec![ChatMessage::user("hello")];
    let long: Vec<ChatMessage> = (0..20)
        .flat_map(|i| {
            [
                ChatMessage::user(format!("question number {} about the listing", i)),
                ChatMessage::assistant("a fairly long answer ".repeat(20)),
            ]
        })
        .collect();

    let mut group = c.benchmark_group("cache_key");
    group.bench_function("single_turn", |b| {
        b.iter(|| cache.key(black_box(system_prompt), black_box(&short)))
    });
    group.bench_function("forty_turns", |b| {
        b.iter(|| cache.key(black_box(system_prompt), black_box(&long)))
    });
    group.finish();
}

fn bench_fallback(c: &mut Criterion) {
    let responder = FallbackResponder::new();
    let messages = vec![ChatMessage::user(
        "Could you tell me which neighborhood this apartment is in?",
    )];

    c.bench_function("fallback_generate", |b| {
        b.iter(|| responder.generate(black_box(&messages), "sys"))
    });
}

fn bench_cached_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let dispatcher = Dispatcher::new(
        CredentialPool::new(vec![SecretString::from("bench-key".to_string())]),
        ModelRotation::new(default_catalog()).expect("default catalog is non-empty"),
        Arc::new(ImmediateUpstream),
    );
    let messages = vec![ChatMessage::user("hello")];
    let options = SendOptions::default();

    runtime.block_on(async {
        dispatcher
            .send(&messages, "sys", &options)
            .await
            .expect("warm-up dispatch");
    });

    c.bench_function("dispatch_cache_hit", |b| {
        b.to_async(&runtime)
            .iter(|| dispatcher.send(black_box(&messages), "sys", &options))
    });
}

criterion_group!(
    benches,
    bench_classify,
    bench_cache_key,
    bench_fallback,
    bench_cached_dispatch
);
criterion_main!(benches);
