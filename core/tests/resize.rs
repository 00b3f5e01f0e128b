//! Resize adapter: deferred, coalesced layout checks and clean detach.

mod common;

use common::{container, engine, point};
use rakshasutra_core::{
    event::ConsoleEvent,
    geo::Size,
    resize::ResizeAdapter,
    surface::Container,
    types::Category,
};

fn layout_checks(events: &[ConsoleEvent]) -> Vec<(f64, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            ConsoleEvent::LayoutInvalidated { width, changed, .. } => Some((*width, *changed)),
            _ => None,
        })
        .collect()
}

#[test]
fn resize_is_applied_one_turn_later() {
    let mut console = engine();
    console.mount(container()).expect("mount");
    console.take_events();

    // Side panel opens: the map loses 300px.
    assert!(console.container_resized(Size::new(500.0, 600.0)).expect("resize"));
    let measured = console.surface().expect("surface").measured_size();
    assert_eq!(measured.width, 800.0, "check must not run synchronously");

    let events = console.flush().expect("flush");
    assert_eq!(layout_checks(&events), vec![(500.0, true)]);
    assert_eq!(console.surface().expect("surface").measured_size().width, 500.0);
}

#[test]
fn burst_of_resizes_runs_one_check_with_the_final_size() {
    let mut console = engine();
    console.mount(container()).expect("mount");

    assert!(console.container_resized(Size::new(700.0, 600.0)).expect("resize"));
    assert!(!console.container_resized(Size::new(600.0, 600.0)).expect("resize"));
    assert!(!console.container_resized(Size::new(500.0, 600.0)).expect("resize"));

    let events = console.flush().expect("flush");
    assert_eq!(layout_checks(&events), vec![(500.0, true)]);
    assert_eq!(console.resize_adapter().observed_changes(), 3);
}

#[test]
fn unchanged_size_schedules_nothing() {
    let mut console = engine();
    console.mount(container()).expect("mount");
    assert!(!console.container_resized(Size::new(800.0, 600.0)).expect("resize"));
    assert!(layout_checks(&console.flush().expect("flush")).is_empty());
}

#[test]
fn every_overlay_update_queues_a_layout_check() {
    let mut console = engine();
    console.mount(container()).expect("mount");
    console
        .points_updated(vec![point(1, 22.7, 75.8, Category::Sms)])
        .expect("points");

    let events = console.flush().expect("flush");
    assert_eq!(layout_checks(&events), vec![(800.0, false)]);
}

#[test]
fn unmount_cancels_a_pending_check() {
    let mut console = engine();
    console.mount(container()).expect("mount");
    console.container_resized(Size::new(500.0, 600.0)).expect("resize");
    console.unmount().expect("unmount");

    let events = console.flush().expect("flush");
    assert!(layout_checks(&events).is_empty(), "no layout work after teardown");
}

#[test]
fn resize_after_unmount_is_ignored() {
    let mut console = engine();
    console.mount(container()).expect("mount");
    console.unmount().expect("unmount");
    assert!(!console.container_resized(Size::new(100.0, 100.0)).expect("resize"));
    assert!(!console.resize_adapter().is_observing());
}

#[test]
fn adapter_detaches_exactly_once() {
    let mut adapter = ResizeAdapter::new();
    assert!(!adapter.detach(), "nothing to detach before observing");

    adapter.observe(&container());
    assert!(adapter.is_observing());
    assert!(adapter.detach());
    assert!(!adapter.detach(), "second detach is a no-op");
    assert!(!adapter.notify(&Container::new("map", Size::new(10.0, 10.0))));
}

#[test]
fn adapter_ignores_other_containers() {
    let mut adapter = ResizeAdapter::new();
    adapter.observe(&container());
    assert!(!adapter.notify(&Container::new("side-panel", Size::new(10.0, 10.0))));
    assert_eq!(adapter.observed_changes(), 0);
}
