//! Same seed, same operations, same console.
//!
//! Two engines on the synthetic feed must produce identical event streams,
//! apart from the per-mount session and surface identifiers.

mod common;

use common::container;
use rakshasutra_core::{
    config::ConsoleConfig,
    console::ConsoleEngine,
    event::ConsoleEvent,
    feed::synthetic_providers,
    table::CategoryFilter,
    types::Category,
};

fn run(seed: u64) -> (ConsoleEngine, Vec<String>) {
    let config = ConsoleConfig::default_test();
    let center = config.map.default_center;
    let mut engine = ConsoleEngine::build(config)
        .expect("engine")
        .with_providers(synthetic_providers(seed, center));
    engine.mount(container()).expect("mount");

    let mut events = Vec::new();
    for step in 0..60 {
        events.extend(engine.advance(1_000).expect("advance"));
        if step == 30 {
            engine.set_filter(CategoryFilter::Only(Category::Sms)).expect("filter");
            // May be rejected when no SMS row has text yet; either way is deterministic.
            let _ = engine.run_scoring();
            events.extend(engine.take_events());
        }
    }

    let log = events
        .iter()
        .filter(|e| {
            !matches!(
                e,
                ConsoleEvent::ViewMounted { .. }
                    | ConsoleEvent::SurfaceCreated { .. }
                    | ConsoleEvent::SurfaceDestroyed { .. }
                    | ConsoleEvent::ViewUnmounted { .. }
            )
        })
        .map(|e| serde_json::to_string(e).expect("encode"))
        .collect();
    (engine, log)
}

#[test]
fn same_seed_same_event_stream() {
    let (a, log_a) = run(12345);
    let (b, log_b) = run(12345);

    assert!(!log_a.is_empty());
    for (i, (x, y)) in log_a.iter().zip(log_b.iter()).enumerate() {
        assert_eq!(x, y, "event {i} diverged");
    }
    assert_eq!(log_a.len(), log_b.len());

    assert_eq!(a.markers(), b.markers());
    assert_eq!(a.viewport(), b.viewport());
    assert_eq!(a.table().rows(), b.table().rows());
    let ids_a: Vec<_> = a.table().results().ids().cloned().collect();
    let ids_b: Vec<_> = b.table().results().ids().cloned().collect();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn different_seeds_diverge() {
    let (_, log_a) = run(1);
    let (_, log_b) = run(2);
    assert_ne!(log_a, log_b);
}

#[test]
fn synthetic_cycles_render_exactly_the_valid_points() {
    let (engine, log) = run(777);
    let mut last_rendered = None;
    for line in &log {
        let event: ConsoleEvent = serde_json::from_str(line).expect("decode");
        if let ConsoleEvent::OverlayReplaced { received, rendered, discarded, .. } = event {
            assert_eq!(rendered + discarded, received);
            last_rendered = Some(rendered);
        }
    }
    assert_eq!(Some(engine.markers().len()), last_rendered);

    let visible = engine.surface().expect("surface").visible_bounds();
    for marker in engine.markers() {
        assert!(visible.contains(marker.position), "marker {} outside view", marker.report_id);
    }
}
