//! Overlay reconciliation: full replace, coordinate validation, view fit.

mod common;

use common::{container, engine, engine_with_config, point};
use rakshasutra_core::{
    config::ConsoleConfig,
    event::ConsoleEvent,
    geo::LatLng,
    overlay::{popup_label, GeoPoint, OverlayReconciler},
    rng::{FeedBank, StreamSlot},
    surface::{SurfaceManager, ViewChange},
    types::{Category, LooseBatch, StreamKind},
};

#[test]
fn marker_count_equals_valid_point_count() {
    for seed in 1..=20u64 {
        let mut rng = FeedBank::new(seed).for_stream(StreamSlot::Points);
        let batch: Vec<GeoPoint> = (0..rng.between(0, 40))
            .map(|i| {
                let lat = match rng.between(0, 9) {
                    0 => f64::NAN,
                    1 => f64::INFINITY,
                    _ => 22.7 + rng.jitter(0.1),
                };
                let lon = if rng.chance(0.1) { f64::NEG_INFINITY } else { 75.8 + rng.jitter(0.1) };
                point(i, lat, lon, *rng.pick(&Category::ALL))
            })
            .collect();
        let finite = batch.iter().filter(|p| p.lat.is_finite() && p.lon.is_finite()).count();

        let mut surfaces = SurfaceManager::new(ConsoleConfig::default_test().map);
        surfaces.create(&container()).expect("create");
        let report = OverlayReconciler::new()
            .reconcile(&mut surfaces, &LooseBatch::from(batch.clone()))
            .expect("reconcile");

        assert_eq!(surfaces.markers().len(), finite, "seed {seed}: marker count");
        assert_eq!(report.rendered, finite);
        assert_eq!(report.discarded, batch.len() - finite);
    }
}

#[test]
fn nan_point_is_dropped_and_view_fits_the_rest() {
    let mut console = engine();
    console.mount(container()).expect("mount");

    let batch = vec![
        point(1, 22.70, 75.85, Category::Sms),
        point(2, f64::NAN, 75.90, Category::Url),
        point(3, 22.75, 75.88, Category::Voip),
    ];
    let report = console.points_updated(batch).expect("points").expect("mounted");

    let ids: Vec<String> = console.markers().iter().map(|m| m.report_id.to_string()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(report.discarded, 1);

    let visible = console.surface().expect("surface").visible_bounds();
    for m in console.markers() {
        assert!(visible.contains(m.position), "marker {} outside view", m.report_id);
    }
}

#[test]
fn sms_point_survives_a_url_point_with_nan_latitude() {
    let mut console = engine();
    console.mount(container()).expect("mount");

    let report = console
        .points_updated(vec![
            point(1, 22.72, 75.86, Category::Sms),
            point(2, f64::NAN, 75.86, Category::Url),
        ])
        .expect("points")
        .expect("mounted");

    assert_eq!(report.rendered, 1);
    assert_eq!(console.markers().len(), 1);
    assert_eq!(console.markers()[0].style.color, "#e07b3a");
    let visible = console.surface().expect("surface").visible_bounds();
    assert!(visible.contains(LatLng::new(22.72, 75.86)));
}

#[test]
fn each_cycle_replaces_the_previous_markers() {
    let mut console = engine();
    console.mount(container()).expect("mount");

    console
        .points_updated(vec![
            point(1, 22.70, 75.85, Category::Sms),
            point(2, 22.71, 75.86, Category::Sms),
        ])
        .expect("first batch");
    console
        .points_updated(vec![point(7, 22.72, 75.87, Category::Url)])
        .expect("second batch");

    let ids: Vec<String> = console.markers().iter().map(|m| m.report_id.to_string()).collect();
    assert_eq!(ids, vec!["7"], "markers from the previous cycle must be gone");
    assert_eq!(console.overlay_cycles(), 2);
}

#[test]
fn empty_batch_clears_markers_and_resets_view() {
    let mut console = engine();
    console.mount(container()).expect("mount");
    console
        .points_updated(vec![point(1, 19.07, 72.87, Category::Voip)])
        .expect("points");

    let report = console.points_updated(Vec::new()).expect("empty").expect("mounted");
    assert!(console.markers().is_empty());
    match report.view {
        ViewChange::Reset { viewport } => {
            let defaults = &console.config().map;
            assert_eq!(viewport.center, defaults.default_center);
            assert_eq!(viewport.zoom, defaults.default_zoom);
        }
        other => panic!("expected reset, got {other:?}"),
    }
    let events = console.take_events();
    assert!(events.iter().any(|e| matches!(e, ConsoleEvent::ViewportReset { .. })));
}

#[test]
fn markers_carry_category_style_and_popup() {
    let mut console = engine();
    console.mount(container()).expect("mount");
    console
        .points_updated(vec![point(42, 22.7, 75.8, Category::Voip)])
        .expect("points");

    let marker = &console.markers()[0];
    assert_eq!(marker.style.color, "#d32f2f");
    assert_eq!(marker.style.radius, 8.0);
    assert_eq!(marker.style.fill_opacity, 0.25);
    assert_eq!(marker.popup, "VOIP #42");
    assert_eq!(popup_label(&point(5, 0.0, 0.0, Category::Sms)), "SMS #5");
}

#[test]
fn batch_before_mount_is_ignored() {
    let mut console = engine();
    let outcome = console
        .points_updated(vec![point(1, 22.7, 75.8, Category::Sms)])
        .expect("ignored, not an error");
    assert!(outcome.is_none());
    assert!(console.markers().is_empty());
}

#[test]
fn loose_coordinates_decode_or_become_nan() {
    let raw = r#"[
        {"id": 1, "lat": 22.7, "lon": 75.8, "type": "sms"},
        {"id": 2, "lat": " 22.71 ", "lon": "75.81", "type": "URL"},
        {"id": "3", "lat": null, "lon": 75.82, "type": "voip"},
        {"id": 4, "lon": 75.83, "type": "sms"},
        {"id": 5, "lat": "north", "lon": 75.84, "type": "sms"},
        {"id": 6, "lat": [1, 2], "lon": true, "type": "url"}
    ]"#;
    let batch: Vec<GeoPoint> = serde_json::from_str(raw).expect("decode");
    assert_eq!(batch.len(), 6);

    let valid: Vec<&str> = batch.iter().filter(|p| p.is_valid()).map(|p| p.id.as_str()).collect();
    assert_eq!(valid, vec!["1", "2"]);
    assert_eq!(batch[1].lat, 22.71);
    assert_eq!(batch[1].category, Category::Url);
    assert!(batch[2].lat.is_nan(), "null must not decode to zero");
    assert!(batch[3].lat.is_nan(), "missing field decodes to NaN");
}

#[test]
fn undecodable_records_are_dropped_not_the_whole_batch() {
    let raw = r#"[
        {"id": 1, "lat": 22.72, "lon": 75.86, "type": "sms"},
        {"id": 2, "lat": 22.73, "lon": 75.87, "type": "email"},
        {"id": null, "lat": 22.74, "lon": 75.88, "type": "url"},
        {"id": 4, "lat": "north", "lon": 75.89, "type": "voip"},
        "not a record"
    ]"#;
    let batch: LooseBatch<GeoPoint> = serde_json::from_str(raw).expect("decode");
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.rejected, 3);

    let mut console = engine();
    console.mount(container()).expect("mount");
    console
        .points_updated(vec![point(9, 19.07, 72.87, Category::Voip)])
        .expect("previous cycle");

    let report = console.points_decoded(batch).expect("points").expect("mounted");
    assert_eq!(report.received, 5);
    assert_eq!(report.rendered, 1);
    assert_eq!(report.discarded, 4);

    let ids: Vec<String> = console.markers().iter().map(|m| m.report_id.to_string()).collect();
    assert_eq!(ids, vec!["1"], "the good record replaces the previous cycle");
}

#[test]
fn stale_point_response_is_discarded_when_enabled() {
    let mut config = ConsoleConfig::default_test();
    config.polling.discard_stale_responses = true;
    let (mut console, feed) = engine_with_config(config);
    // The immediate poll is slow, the 5s interval poll is fast.
    feed.points.push(7_000, Ok(vec![point(1, 22.70, 75.85, Category::Sms)]));
    feed.points.push(100, Ok(vec![point(2, 22.71, 75.86, Category::Url)]));
    console.mount(container()).expect("mount");

    console.advance(5_200).expect("advance");
    let ids: Vec<String> = console.markers().iter().map(|m| m.report_id.to_string()).collect();
    assert_eq!(ids, vec!["2"]);

    let events = console.advance(2_000).expect("advance");
    let ids: Vec<String> = console.markers().iter().map(|m| m.report_id.to_string()).collect();
    assert_eq!(ids, vec!["2"], "the older response must not overwrite the newer one");
    assert!(events.iter().any(|e| matches!(
        e,
        ConsoleEvent::StaleResponseDiscarded { stream: StreamKind::Points, generation: 1, .. }
    )));
    assert_eq!(console.overlay_cycles(), 1);
}
