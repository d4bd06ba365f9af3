//! Benchmarks for stickylb components.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use stickylb::backend::PeerState;
use stickylb::config::{ServerConfig, StickyConfig, UpstreamConfig};
use stickylb::metrics::{MetricsCollector, Outcome};
use stickylb::sticky::{UpstreamGroup, find_cookie};
use stickylb::util::RequestId;
use std::sync::Arc;

const NOW: u64 = 1_700_000_000;

fn create_group(sticky: &str, num_servers: usize) -> Arc<UpstreamGroup> {
    let servers: Vec<ServerConfig> = (0..num_servers)
        .map(|i| {
            let mut s = ServerConfig::new(format!("127.0.0.1:{}", 9000 + i).parse().unwrap());
            s.weight = (i % 3 + 1) as u32;
            s
        })
        .collect();

    let config = UpstreamConfig {
        name: "test".to_string(),
        servers,
        balancer: None,
        sticky: Some(StickyConfig::from_directive(sticky).unwrap()),
    };

    Arc::new(UpstreamGroup::build(&config).unwrap())
}

fn benchmark_fallback(c: &mut Criterion) {
    let mut group = c.benchmark_group("fallback_select");

    for (name, directive) in [("round_robin", "hash=md5"), ("least_conn", "hash=md5 lb_alg=lc")] {
        let upstream = create_group(directive, 10);

        group.bench_function(name, |b| {
            b.iter(|| {
                let mut req = upstream.begin(std::iter::empty());
                black_box(req.get_peer_at(NOW).unwrap());
                req.free_peer_at(PeerState::Succeeded, NOW);
            })
        });
    }

    group.finish();
}

fn benchmark_sticky_hit(c: &mut Criterion) {
    let upstream = create_group("hash=sha1 lb_alg=lc", 10);
    let header = format!("session=abc; route={}", upstream.cookie_value(7).unwrap());

    c.bench_function("sticky_hit", |b| {
        b.iter(|| {
            let mut req = upstream.begin([black_box(header.as_str())]);
            black_box(req.get_peer_at(NOW).unwrap());
            req.free_peer_at(PeerState::Succeeded, NOW);
        })
    });
}

fn benchmark_digest_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest_find");

    for num_servers in [4, 32, 256] {
        let upstream = create_group("hash=md5", num_servers);
        let Some(table) = upstream.digests() else {
            continue;
        };
        let last = table.get(num_servers - 1).unwrap().to_string();

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(num_servers), &last, |b, value| {
            b.iter(|| black_box(table.find(value)))
        });
    }

    group.finish();
}

fn benchmark_cookie_parsing(c: &mut Criterion) {
    let headers = [
        "_ga=GA1.2.3.4; theme=dark; lang=en",
        "session=0123456789abcdef; route=5d41402abc4b2a76b9719d911017c592",
    ];

    c.bench_function("find_cookie", |b| {
        b.iter(|| black_box(find_cookie(headers, black_box("route"))))
    });
}

fn benchmark_metrics(c: &mut Criterion) {
    let collector = MetricsCollector::new();

    let mut group = c.benchmark_group("metrics");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record_selection", |b| {
        b.iter(|| {
            collector.record_selection(black_box("api"), black_box(Outcome::Fallback));
        })
    });

    group.bench_function("record_cookie", |b| {
        b.iter(|| {
            collector.record_cookie(black_box("api"));
        })
    });

    group.finish();
}

fn benchmark_request_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_id");

    group.bench_function("uuid", |b| {
        b.iter(|| {
            black_box(RequestId::new());
        })
    });

    group.bench_function("short", |b| {
        b.iter(|| {
            black_box(RequestId::short());
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_fallback,
    benchmark_sticky_hit,
    benchmark_digest_lookup,
    benchmark_cookie_parsing,
    benchmark_metrics,
    benchmark_request_id,
);
criterion_main!(benches);
