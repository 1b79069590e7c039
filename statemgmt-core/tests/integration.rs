//! Integration Tests for the State Management Core
//!
//! These tests drive the engine, monitors, computed properties and the
//! recycle pool together, the way generated component code does.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use statemgmt_core::legacy::LegacySubscriber;
use statemgmt_core::observe::{IdKind, MIN_WATCH_ID};
use statemgmt_core::{
    Computed, Consumer, ConsumerId, Monitor, MonitorOptions, NotifyMode, ObserveConfig,
    ObserveEngine, ObserveError, ObservedObject, RecyclePool, Value,
};

/// A component stand-in: re-renders by re-reading `count` under recording.
struct Component {
    id: Cell<ConsumerId>,
    state: ObservedObject,
    renders: Cell<usize>,
    last_seen: RefCell<Value>,
}

impl Component {
    fn mount(engine: &ObserveEngine, state: &ObservedObject) -> Rc<Self> {
        let component = Rc::new(Self {
            id: Cell::new(engine.allocate_element_id()),
            state: state.clone(),
            renders: Cell::new(0),
            last_seen: RefCell::new(Value::Undefined),
        });
        engine.start_record_dependencies(&component, component.id.get());
        component.render();
        engine.stop_record_dependencies().unwrap();
        component
    }

    fn render(&self) {
        self.renders.set(self.renders.get() + 1);
        *self.last_seen.borrow_mut() = self.state.get("count");
    }
}

impl Consumer for Component {
    fn on_dependency_changed(&self, id: ConsumerId, engine: &ObserveEngine) {
        engine.clear_refs(id);
        engine.record(id, || self.render());
    }
}

/// Double registration of the same binding keeps one entry.
#[test]
fn duplicate_binding_is_stored_once() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("count", 0)]);
    let id = engine.allocate_element_id();

    engine.add_ref_for_id(id, state.id(), "count");
    engine.add_ref_for_id(id, state.id(), "count");

    assert_eq!(engine.ref_count(state.id(), "count"), 1);
    assert_eq!(engine.consumers_of(state.id(), "count").as_slice(), &[id]);
}

/// Balanced start/stop sequences restore the recorded id.
#[test]
fn nested_rendering_restores_parent_frame() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("count", Value::from(0)), ("title", Value::from("x"))]);
    let parent = Component::mount(&engine, &state);

    let child_state = ObservedObject::with_props(&engine, [("count", 7)]);
    engine.start_record_dependencies(&parent, parent.id.get());
    let child = Component::mount(&engine, &child_state);
    assert_eq!(engine.current_recorded_id(), Some(parent.id.get()));
    state.get("title");
    engine.stop_record_dependencies().unwrap();

    assert_eq!(engine.current_recorded_id(), None);
    assert!(engine.is_bound(parent.id.get(), state.id(), "title"));
    assert!(!engine.is_bound(parent.id.get(), child_state.id(), "count"));
    assert!(engine.is_bound(child.id.get(), child_state.id(), "count"));
}

#[test]
fn execute_unobserved_returns_result_and_keeps_depth() {
    let engine = ObserveEngine::new();
    assert_eq!(engine.execute_unobserved(|| 100), 100);
    assert_eq!(engine.recording_depth(), 0);
}

/// A write reaches its component only after the queue is drained.
#[test]
fn component_rerenders_on_drain() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("count", 0)]);
    let component = Component::mount(&engine, &state);

    state.set("count", 1);
    state.set("count", 2);
    assert_eq!(component.renders.get(), 1);

    engine.update_dirty();
    assert_eq!(component.renders.get(), 2);
    assert_eq!(*component.last_seen.borrow(), Value::from(2));
}

#[test]
fn immediate_mode_rerenders_inside_the_write() {
    let engine = ObserveEngine::with_config(ObserveConfig {
        notify_mode: NotifyMode::Immediate,
        ..ObserveConfig::default()
    });
    let state = ObservedObject::with_props(&engine, [("count", 0)]);
    let component = Component::mount(&engine, &state);

    state.set("count", 3);
    assert_eq!(component.renders.get(), 2);
    assert_eq!(engine.pending_tasks(), 0);
}

#[test]
fn config_loads_from_json() {
    let config = ObserveConfig::from_json_str(r#"{ "notify_mode": "immediate" }"#).unwrap();
    assert_eq!(config.notify_mode, NotifyMode::Immediate);
    assert_eq!(config.max_flush_rounds, ObserveConfig::default().max_flush_rounds);

    let err = ObserveConfig::from_json_str("{ not json").unwrap_err();
    assert!(matches!(err, ObserveError::Config(_)));
}

/// A monitor on three paths has three entries and takes one watch id.
#[test]
fn monitor_registration_uses_one_watch_id() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("testVar1", 1), ("testVar2", 2), ("testVar3", 3)]);
    let before = engine.ids().peek_watch();

    let monitor = Monitor::new(&state, "testVar1 testVar2 testVar3", |_| {}, MonitorOptions::default()).unwrap();

    assert_eq!(monitor.value_count(), 3);
    assert!(monitor.id().raw() >= MIN_WATCH_ID);
    assert_eq!(monitor.id().kind(), IdKind::Monitor);
    assert_eq!(engine.ids().peek_watch().raw() - before.raw(), 1);
}

/// The callback sees the changed paths in declaration order with their
/// before and now values.
#[test]
fn monitor_callback_sees_dirty_paths_and_values() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("testVar1", 1), ("testVar2", 2), ("testVar3", 3)]);
    let seen: Rc<RefCell<Vec<(String, Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    let monitor = Monitor::new(
        &state,
        "testVar1 testVar2 testVar3",
        move |m| {
            for path in m.dirty() {
                let value = m.value(Some(path.as_str())).unwrap();
                sink.borrow_mut().push((path, value.before, value.now));
            }
        },
        MonitorOptions::default(),
    )
    .unwrap();
    monitor.init_run().unwrap();

    state.set("testVar3", 33);
    state.set("testVar2", 22);
    engine.flush().unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            ("testVar2".to_string(), Value::from(2), Value::from(22)),
            ("testVar3".to_string(), Value::from(3), Value::from(33)),
        ]
    );
    assert!(monitor.dirty().is_empty());
}

/// Dirty consumers are notified in the order they became dirty, not the
/// order they were created in.
#[test]
fn monitors_run_in_dirty_order() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("count", Value::from(0)), ("label", Value::from("a"))]);
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&order);
    let on_count = Monitor::new(&state, "count", move |_| sink.borrow_mut().push("count"), MonitorOptions::default())
        .unwrap();
    let sink = Rc::clone(&order);
    let on_label = Monitor::new(&state, "label", move |_| sink.borrow_mut().push("label"), MonitorOptions::default())
        .unwrap();
    on_count.init_run().unwrap();
    on_label.init_run().unwrap();

    state.set("label", "b");
    state.set("count", 1);
    engine.flush().unwrap();

    assert_eq!(*order.borrow(), vec!["label", "count"]);
}

/// A computed property reading another one is re-evaluated when its input
/// changes value, and only then.
#[test]
fn computed_chain_stops_on_unchanged_value() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("a", 1), ("b", 2)]);

    let inputs = state.clone();
    let sum = Computed::new(&state, "sum", move || {
        Value::from(inputs.get("a").as_i64().unwrap_or(0) + inputs.get("b").as_i64().unwrap_or(0))
    });
    let source = sum.clone();
    let doubled = Computed::new(&state, "doubled", move || {
        Value::from(source.get().as_i64().unwrap_or(0) * 2)
    });

    state.set("a", 5);
    engine.flush().unwrap();
    assert_eq!(sum.get_untracked(), Value::from(7));
    assert_eq!(doubled.get_untracked(), Value::from(14));
    assert_eq!(doubled.recompute_count(), 1);

    // 4 + 3 is still 7.
    state.set("a", 4);
    state.set("b", 3);
    engine.flush().unwrap();
    assert_eq!(sum.recompute_count(), 2);
    assert_eq!(doubled.recompute_count(), 1);
}

#[test]
fn target_teardown_unbinds_monitors_and_computed() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("a", 1)]);
    let inputs = state.clone();
    let doubled = Computed::new(&state, "doubled", move || Value::from(inputs.get("a").as_i64().unwrap_or(0) * 2));
    let monitor = Monitor::new(&state, "a", |_| {}, MonitorOptions::default()).unwrap();
    monitor.init_run().unwrap();

    engine.teardown_target(state.id());

    assert!(doubled.is_disposed());
    assert_eq!(engine.binding_count(monitor.id()), 0);
    assert_eq!(engine.binding_count(doubled.id()), 0);
    assert!(matches!(monitor.notify_change(), Err(ObserveError::MonitorNotInitialized(_))));
}

/// Dropping objects, monitors and computed properties without explicit
/// teardown leaves nothing behind in the engine.
#[test]
fn dropped_objects_leave_no_engine_state() {
    let engine = ObserveEngine::new();
    for i in 0..100 {
        let state = ObservedObject::with_props(&engine, [("a", i), ("b", 1)]);
        let monitor = Monitor::new(&state, "a b", |_| {}, MonitorOptions::default()).unwrap();
        monitor.init_run().unwrap();
        let inputs = state.clone();
        let _first = Computed::new(&state, "first", move || inputs.get("a"));
        state.set("a", i + 1);
    }
    engine.flush().unwrap();

    let snapshot = engine.snapshot();
    assert!(snapshot.ref_sets.is_empty());
    assert_eq!(snapshot.total_bindings, 0);
    assert_eq!(snapshot.registered_consumers, 0);
    assert!(snapshot.dirty.is_empty());
    assert_eq!(snapshot.pending_tasks, 0);
}

#[test]
fn recycle_pool_push_pop() {
    let mut pool = RecyclePool::new();
    pool.push_recycle_v2_component("btn1", "button");

    assert_eq!(pool.pop_recycle_v2_component("btn1"), Some("button"));
    assert_eq!(pool.pop_recycle_v2_component("btn1"), None);
    assert_eq!(pool.pop_recycle_v2_component("unknown"), None);
}

#[test]
fn recycle_mapping_survives_purge() {
    let mut pool = RecyclePool::new();
    pool.push_recycle_v2_component("row", 1u32);
    pool.push_recycle_v2_component("row", 2u32);
    pool.update_recycle_id_mapping(ConsumerId::from_raw(10), ConsumerId::from_raw(99));
    assert_eq!(pool.get_recycle_id_mapping(ConsumerId::from_raw(10)), Some(ConsumerId::from_raw(99)));

    pool.purge_all_cached_recycle_elmt_ids();
    assert_eq!(pool.pooled_count(), 0);
    assert_eq!(pool.get_recycle_id_mapping(ConsumerId::from_raw(10)), Some(ConsumerId::from_raw(99)));
}

/// Retire a component, reuse it under a new id, and check that its
/// bindings and monitors follow.
#[test]
fn reused_component_keeps_reacting_under_new_id() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("count", 0)]);
    let component = Component::mount(&engine, &state);
    let monitor = Monitor::new(&state, "count", |_| {}, MonitorOptions::default()).unwrap();
    monitor.init_run().unwrap();

    let mut pool = RecyclePool::new();
    let original = component.id.get();
    pool.push_recycle_v2_component("counter", Rc::clone(&component));

    let reused = pool.pop_recycle_v2_component("counter").unwrap();
    let proxy = engine.allocate_element_id();
    pool.update_recycle_id_mapping(original, proxy);
    engine.rebind_consumer(original, proxy);
    reused.id.set(proxy);

    engine.execute_unobserved(|| state.set("count", 10));
    monitor.notify_change_on_reuse().unwrap();
    engine.flush().unwrap();

    assert!(engine.is_bound(proxy, state.id(), "count"));
    assert!(!engine.is_bound(original, state.id(), "count"));
    assert_eq!(*reused.last_seen.borrow(), Value::from(10));
    assert_eq!(monitor.notify_count(), 0, "reuse resets the baseline silently");
    assert_eq!(pool.id_map().original_id(proxy), Some(original));
}

struct LegacyProp {
    id: ConsumerId,
}

impl LegacySubscriber for LegacyProp {
    fn id(&self) -> ConsumerId {
        self.id
    }
}

#[test]
fn legacy_subscribers_round_trip() {
    let engine = ObserveEngine::new();
    let manager = engine.subscriber_manager();
    let element = engine.allocate_element_id();

    let id = manager.make_id();
    assert_ne!(id, element, "legacy and element ids share one counter");

    let before = manager.num_subscribers();
    assert!(manager.add(Rc::new(LegacyProp { id })));
    assert!(manager.has(id));
    assert_eq!(manager.num_subscribers(), before + 1);

    assert!(manager.delete(id));
    assert!(!manager.has(id));
    assert!(manager.find(id).is_none());
    assert_eq!(manager.num_subscribers(), before);
}

#[test]
fn engine_snapshot_reports_state() {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, [("count", 0)]);
    let component = Component::mount(&engine, &state);
    state.set("count", 1);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.dirty, vec![component.id.get()]);
    assert_eq!(snapshot.pending_tasks, 1);
    assert_eq!(snapshot.total_bindings, 1);

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"property\":\"count\""));
}
