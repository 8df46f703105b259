//! End-to-end run through `Engine::run_main`, the way a generated entry point
//! drives a suite: fixtures, once-fixtures, hooks, labels and sub-tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rsfixture::{Engine, Handle, LabelRegistry};

#[derive(Clone)]
struct Widget {
    parts: Vec<&'static str>,
}

fn build_widget() -> Widget {
    Widget {
        parts: vec!["gear", "spring"],
    }
}

#[derive(Clone)]
struct Warehouse {
    opened: Arc<AtomicU32>,
}

static WAREHOUSES: AtomicU32 = AtomicU32::new(0);

fn open_warehouse() -> Warehouse {
    WAREHOUSES.fetch_add(1, Ordering::SeqCst);
    Warehouse {
        opened: Arc::new(AtomicU32::new(0)),
    }
}

#[derive(Clone)]
struct Visit(u32);

fn visit(t: Handle, w: Warehouse) -> Visit {
    let n = w.opened.fetch_add(1, Ordering::SeqCst) + 1;
    let closing = w.clone();
    t.after_test(move || {
        closing.opened.fetch_sub(1, Ordering::SeqCst);
    });
    Visit(n)
}

fn widget_has_parts(t: Handle, w: Widget) {
    if w.parts.is_empty() {
        t.fail("widget has no parts");
    }
}

fn warehouse_is_shared(_w: Warehouse) {
    assert_eq!(WAREHOUSES.load(Ordering::SeqCst), 1);
}

fn visits_are_scoped(t: Handle, v: Visit) {
    assert_eq!(v.0, 1);
    t.run("nested visit", |v: Visit| assert_eq!(v.0, 2));
    t.run("another nested visit", |v: Visit| assert_eq!(v.0, 2));
}

fn not_ready(t: Handle) {
    t.skip("waiting on the new inventory format");
}

fn regression_only() {
    panic!("not selected by the default label");
}

fn main() {
    rsfixture::logging::init();

    let mut engine = Engine::new();
    engine.declare_labels(&LabelRegistry::with_builtin());
    engine.register_fixture(build_widget).unwrap();
    engine.register_once_fixture(open_warehouse).unwrap();
    engine.register_fixture(visit).unwrap();

    engine.register_test("widget_has_parts", widget_has_parts, &[]).unwrap();
    engine
        .register_test("warehouse_is_shared", warehouse_is_shared, &["unit", "integration"])
        .unwrap();
    engine.register_test("visits_are_scoped", visits_are_scoped, &["unit"]).unwrap();
    engine.register_test("not_ready", not_ready, &["unit"]).unwrap();
    engine
        .register_test("regression_only", regression_only, &["regression"])
        .unwrap();

    engine.run_main();
}
