//! Integration tests for stickylb.
//!
//! These tests drive whole requests through the public API: configuration,
//! upstream groups, cookie matching, fallback and failure accounting.

use std::sync::Arc;
use std::thread;

use stickylb::backend::{Busy, PeerState};
use stickylb::config::{ServerConfig, StickyConfig, UpstreamConfig, parse_config};
use stickylb::metrics::{MetricsCollector, Outcome};
use stickylb::sticky::UpstreamGroup;

const NOW: u64 = 1_700_000_000;

fn upstream(primary: usize, backup: usize, sticky: Option<&str>) -> UpstreamConfig {
    UpstreamConfig {
        name: "app".to_string(),
        servers: (0..primary + backup)
            .map(|i| {
                let mut s = ServerConfig::new(format!("192.168.1.{}:8080", i + 1).parse().unwrap());
                s.backup = i >= primary;
                s
            })
            .collect(),
        balancer: None,
        sticky: sticky.map(|s| StickyConfig::from_directive(s).unwrap()),
    }
}

fn group(primary: usize, backup: usize, sticky: &str) -> Arc<UpstreamGroup> {
    Arc::new(UpstreamGroup::build(&upstream(primary, backup, Some(sticky))).unwrap())
}

#[test]
fn test_cookie_round_trip() {
    let modes = [
        "hash=index",
        "hash=md5",
        "hash=sha1",
        "text=raw",
        "text=md5",
        "text=sha1",
        "hmac=md5 hmac_key=secret",
        "hmac=sha1 hmac_key=secret lb_alg=lc",
    ];

    for mode in modes {
        let group = group(4, 0, mode);

        for _ in 0..4 {
            let mut first = group.begin(std::iter::empty());
            let chosen = first.get_peer_at(NOW).unwrap();
            let cookie = first.take_cookie().unwrap();
            first.free_peer_at(PeerState::Succeeded, NOW);

            let header = format!("other=1; {}={}", cookie.name, cookie.value);
            let mut second = group.begin([header.as_str()]);
            assert_eq!(second.selected_peer(), Some(chosen.index), "mode {mode}");

            let again = second.get_peer_at(NOW).unwrap();
            assert_eq!(again.index, chosen.index, "mode {mode}");
            assert!(second.take_cookie().is_none(), "mode {mode}");
            second.free_peer_at(PeerState::Succeeded, NOW);
        }
    }
}

#[test]
fn test_retries_never_repeat_a_peer() {
    let group = group(5, 0, "hash=md5 lb_alg=lc");
    let mut req = group.begin(std::iter::empty());

    let mut seen = Vec::new();
    loop {
        match req.get_peer_at(NOW) {
            Ok(peer) => {
                assert!(!seen.contains(&peer.index));
                seen.push(peer.index);
                // Bits only accumulate within the request.
                assert_eq!(req.tried().count(), seen.len());
                req.free_peer_at(PeerState::Failed, NOW);
            }
            Err(busy) => {
                assert_eq!(busy, Busy::Exhausted);
                break;
            }
        }
    }

    assert_eq!(seen.len(), 5);
}

#[test]
fn test_failed_sticky_peer_excluded_until_timeout() {
    let group = group(3, 0, "hash=index");
    let header = ["route=1"];

    let mut req = group.begin(header);
    assert_eq!(req.get_peer_at(NOW).unwrap().index, 1);
    req.free_peer_at(PeerState::Failed, NOW);

    // max_fails=1: within fail_timeout the sticky peer is skipped.
    let mut req = group.begin(header);
    let other = req.get_peer_at(NOW + 5).unwrap();
    assert_ne!(other.index, 1);
    assert!(req.take_cookie().is_some());
    req.free_peer_at(PeerState::Succeeded, NOW + 5);

    // Past the window the failure is forgiven.
    let mut req = group.begin(header);
    assert_eq!(req.get_peer_at(NOW + 11).unwrap().index, 1);
    assert_eq!(group.pool().snapshot(1).unwrap().fails, 0);
}

#[test]
fn test_no_fallback_never_invokes_balancer() {
    let group = group(3, 0, "hash=sha1 no_fallback");
    group.pool().write()[2].down = true;

    let value = group.cookie_value(2).unwrap();
    let header = format!("route={value}");
    let mut req = group.begin([header.as_str()]);

    assert_eq!(req.get_peer_at(NOW), Err(Busy::NoFallback));
    assert_eq!(req.algorithm(), None);
    assert_eq!(req.tried().count(), 0);
    for index in 0..3 {
        assert_eq!(group.pool().snapshot(index).unwrap().conns, 0);
    }
}

#[test]
fn test_backup_pool_used_when_primary_exhausted() {
    let group = group(2, 2, "hash=index");
    {
        let mut peers = group.pool().write();
        peers[0].down = true;
        peers[1].fails = 1;
        peers[1].checked = NOW;
        peers[1].accessed = NOW;
    }

    let mut req = group.begin(["route=1"]);
    let selected = req.get_peer_at(NOW).unwrap();

    assert!(selected.backup);
    assert!(req.is_backup());
    assert_eq!(req.tried().count(), 1);
    assert!(selected.index < 2);

    req.free_peer_at(PeerState::Failed, NOW);
    let second = req.get_peer_at(NOW).unwrap();
    assert!(second.backup);
    assert_ne!(second.address, selected.address);

    req.free_peer_at(PeerState::Failed, NOW);
    assert_eq!(req.get_peer_at(NOW), Err(Busy::Exhausted));
}

#[test]
fn test_single_backup_peer_is_tried_once() {
    let group = group(2, 1, "hash=index lb_alg=lc");
    let mut req = group.begin(std::iter::empty());

    for _ in 0..2 {
        assert!(!req.get_peer_at(NOW).unwrap().backup);
        req.free_peer_at(PeerState::Failed, NOW);
    }

    let backup = req.get_peer_at(NOW).unwrap();
    assert!(backup.backup);
    assert_eq!(backup.index, 0);
    req.free_peer_at(PeerState::Failed, NOW);

    assert_eq!(req.get_peer_at(NOW), Err(Busy::Exhausted));

    let backup_pool = group.pool().backup().unwrap();
    let peer = backup_pool.snapshot(0).unwrap();
    assert_eq!(peer.fails, 1);
    assert_eq!(peer.conns, 0);
}

#[test]
fn test_no_fallback_does_not_reach_backup_pool() {
    // A down sticky peer under no_fallback fails the attempt even though a
    // backup pool could serve it.
    let group = group(2, 1, "hash=index no_fallback");
    {
        let mut peers = group.pool().write();
        peers[0].down = true;
        peers[1].down = true;
    }

    let mut req = group.begin(["route=0"]);
    assert_eq!(req.get_peer_at(NOW), Err(Busy::NoFallback));
    assert!(!req.is_backup());

    // Without the cookie the balancer does reach the backup pool.
    let mut req = group.begin(std::iter::empty());
    assert!(req.get_peer_at(NOW).unwrap().backup);
}

#[test]
fn test_single_peer_upstream_is_not_sticky() {
    let group = group(1, 0, "hash=md5");
    assert!(!group.sticky_enabled());
    assert!(group.digests().is_none());

    let mut req = group.begin(["route=0"]);
    assert_eq!(req.selected_peer(), None);
    assert_eq!(req.get_peer_at(NOW).unwrap().index, 0);
    assert!(req.take_cookie().is_none());

    // A failure on a single peer never takes it out of service.
    req.free_peer_at(PeerState::Failed, NOW);
    let peer = group.pool().snapshot(0).unwrap();
    assert_eq!(peer.fails, 0);
    assert_eq!(peer.conns, 0);

    // But the same request does not retry it.
    assert_eq!(req.get_peer_at(NOW), Err(Busy::Exhausted));
    assert_eq!(group.pool().snapshot(0).unwrap().conns, 0);

    let mut req = group.begin(std::iter::empty());
    assert!(req.get_peer_at(NOW).is_ok());
}

#[test]
fn test_least_conn_tie_break_alternates_by_weight() {
    let mut config = upstream(2, 0, Some("hash=index lb_alg=lc"));
    config.servers[0].weight = 2;
    let group = Arc::new(UpstreamGroup::build(&config).unwrap());
    {
        let mut peers = group.pool().write();
        peers[0].conns = 2;
        peers[1].conns = 1;
    }

    let mut picks = Vec::new();
    for _ in 0..6 {
        let mut req = group.begin(std::iter::empty());
        picks.push(req.get_peer_at(NOW).unwrap().index);
        req.free_peer_at(PeerState::Succeeded, NOW);
    }

    assert_eq!(picks, vec![0, 1, 0, 0, 1, 0]);
}

#[test]
fn test_concurrent_requests_balance_connections() {
    // max_fails=0 keeps every peer in service while failures are reported.
    let mut config = upstream(4, 0, Some("hash=md5 lb_alg=lc"));
    for server in &mut config.servers {
        server.max_fails = 0;
    }
    let group = Arc::new(UpstreamGroup::build(&config).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                for i in 0..200 {
                    let mut req = group.begin(std::iter::empty());
                    req.get_peer_at(NOW).unwrap();
                    let state = if i % 50 == 0 {
                        PeerState::Failed
                    } else {
                        PeerState::Succeeded
                    };
                    req.free_peer_at(state, NOW + 100);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for index in 0..4 {
        assert_eq!(group.pool().snapshot(index).unwrap().conns, 0);
    }
}

#[test]
fn test_config_file_to_routing() {
    use std::io::Write as IoWrite;
    use stickylb::config::load_config;
    use stickylb::state::AppState;
    use tempfile::NamedTempFile;

    let yaml = r#"
global:
  log_level: debug
  log_format: pretty

upstreams:
  - name: web
    sticky:
      name: srv
      hash: sha1
      httponly: true
      expires: 1h
    servers:
      - address: "10.1.0.1:80"
        weight: 2
      - address: "10.1.0.2:80"
      - address: "10.1.0.9:80"
        backup: true

  - name: api
    sticky: "name=api_route hash=index lb_alg=lc no_fallback"
    servers:
      - address: "10.2.0.1:80"
      - address: "10.2.0.2:80"
"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = load_config(file.path()).unwrap();
    let state = AppState::new(&config).unwrap();
    let router = state.router();

    let mut req = router.begin("web", std::iter::empty()).unwrap();
    req.get_peer_at(NOW).unwrap();
    let cookie = req.take_cookie().unwrap().to_string();
    assert!(cookie.starts_with("srv="));
    assert!(cookie.ends_with("; Path=/; Max-Age=3600; HttpOnly"));

    let mut req = router.begin("api", ["api_route=1"]).unwrap();
    assert_eq!(req.get_peer_at(NOW).unwrap().address, "10.2.0.2:80".parse().unwrap());
    assert!(req.no_fallback());

    assert_eq!(state.metrics().selections("web", Outcome::Fallback), 1);
    assert_eq!(state.metrics().selections("api", Outcome::Sticky), 1);
}

#[test]
fn test_config_rejects_conflicting_identity() {
    let yaml = r#"
upstreams:
  - name: web
    sticky: "hash=md5 text=raw"
    servers:
      - address: "10.1.0.1:80"
"#;

    assert!(parse_config(yaml).is_err());
}

#[test]
fn test_config_rejects_sticky_with_balancer() {
    let yaml = r#"
upstreams:
  - name: web
    balancer: least_conn
    sticky: "hash=md5"
    servers:
      - address: "10.1.0.1:80"
      - address: "10.1.0.2:80"
"#;

    let err = parse_config(yaml).unwrap_err().to_string();
    assert!(err.contains("cannot combine sticky"));
}

#[test]
fn test_metrics_collector() {
    let metrics = MetricsCollector::new();
    let group = group(2, 0, "hash=index");

    let mut req = group.begin(std::iter::empty()).with_metrics(metrics.clone());
    req.get_peer_at(NOW).unwrap();

    let text = metrics.encode().unwrap();
    assert!(text.contains("stickylb_selections_total"));
    assert!(text.contains("stickylb_cookies_issued_total{upstream=\"app\"} 1"));
}
