//! Benchmarks for write propagation.
//!
//! Measures the cost of a property write reaching its consumers through the
//! idle queue, with and without monitors in the way.

use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use statemgmt_core::{Consumer, ConsumerId, Monitor, MonitorOptions, ObserveEngine, ObservedObject};

struct Renderer(Cell<usize>);

impl Consumer for Renderer {
    fn on_dependency_changed(&self, _id: ConsumerId, _engine: &ObserveEngine) {
        self.0.set(self.0.get() + 1);
    }
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for consumers in [1, 10, 100, 1000] {
        let engine = ObserveEngine::new();
        let state = ObservedObject::with_props(&engine, [("count", 0)]);
        let renderer = Rc::new(Renderer(Cell::new(0)));
        for _ in 0..consumers {
            let id = engine.allocate_element_id();
            engine.start_record_dependencies(&renderer, id);
            state.get("count");
            let _ = engine.stop_record_dependencies();
        }

        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::new("set_and_drain", consumers), &consumers, |b, _| {
            b.iter(|| {
                next += 1;
                state.set("count", black_box(next));
                engine.update_dirty()
            })
        });
    }

    group.finish();
}

fn bench_monitor_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("monitor");

    for depth in [1usize, 4, 8] {
        let engine = ObserveEngine::new();
        let leaf = ObservedObject::with_props(&engine, [("value", 0)]);
        let mut root = leaf.clone();
        let mut path = String::from("value");
        for _ in 1..depth {
            root = ObservedObject::with_props(&engine, [("child", root)]);
            path.insert_str(0, "child.");
        }

        let monitor = match Monitor::new(&root, &path, |_| {}, MonitorOptions::default()) {
            Ok(monitor) => monitor,
            Err(err) => panic!("monitor setup failed: {err}"),
        };
        if let Err(err) = monitor.init_run() {
            panic!("monitor init failed: {err}");
        }

        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::new("nested_path", depth), &depth, |b, _| {
            b.iter(|| {
                next += 1;
                leaf.set("value", black_box(next));
                engine.update_dirty()
            })
        });
    }

    group.finish();
}

fn bench_recording(c: &mut Criterion) {
    let engine = ObserveEngine::new();
    let state = ObservedObject::with_props(&engine, (0..32).map(|i| (format!("p{i}"), i)));
    let keys = state.keys();
    let id = engine.allocate_element_id();

    c.bench_function("record_32_reads", |b| {
        b.iter(|| {
            engine.clear_refs(id);
            engine.record(id, || {
                for key in &keys {
                    black_box(state.get(key));
                }
            })
        })
    });
}

criterion_group!(benches, bench_fan_out, bench_monitor_paths, bench_recording);
criterion_main!(benches);
