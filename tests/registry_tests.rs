mod common;

use briny_dispatch::{DispatchError, Dispatcher, FloatWidth, Precision, Registry};
use common::{FloatArray, GenericProvider, floats, ints};
use std::sync::Arc;
use std::thread;

fn int_float() -> Dispatcher {
    let d = Dispatcher::new(ints());
    d.add_backend(floats());
    d
}

#[test]
fn add_is_idempotent() {
    let d = int_float();
    assert!(!d.add_backend(floats()));
    assert!(!d.add_backend(ints()));
    assert_eq!(d.backend_names(), vec!["A", "B"]);
}

#[test]
fn default_is_always_registered() {
    let d = int_float();
    assert!(d.get(d.default_backend().name()).is_some());

    d.set_default_backend("B").unwrap();
    assert_eq!(d.default_backend().name(), "B");
    assert!(d.get("B").is_some());
}

#[test]
fn unknown_default_is_rejected() {
    let d = int_float();
    let err = d.set_default_backend("tpu").unwrap_err();
    assert_eq!(err, DispatchError::NotRegistered { name: "tpu".into() });
    assert_eq!(d.default_backend().name(), "A");
}

#[test]
fn removing_default_without_replacement_changes_nothing() {
    let d = int_float();
    let before = d.backend_names();

    let err = d.remove_backend("A", None).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidState(_)), "{err}");
    assert_eq!(d.backend_names(), before);
    assert_eq!(d.default_backend().name(), "A");
    assert_eq!(d.resolve(&[&1_i64]).unwrap().name(), "A");
}

#[test]
fn removing_default_with_replacement() {
    let d = int_float();
    assert!(d.remove_backend("A", Some("B")).unwrap());
    assert_eq!(d.backend_names(), vec!["B"]);
    assert_eq!(d.default_backend().name(), "B");
    assert_eq!(d.resolve(&[&1_i64]).unwrap().name(), "B");
}

#[test]
fn invalid_replacements_change_nothing() {
    let d = int_float();

    let err = d.remove_backend("A", Some("tpu")).unwrap_err();
    assert_eq!(err, DispatchError::NotRegistered { name: "tpu".into() });

    let err = d.remove_backend("A", Some("A")).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidState(_)));

    assert_eq!(d.backend_names(), vec!["A", "B"]);
    assert_eq!(d.default_backend().name(), "A");
}

#[test]
fn removing_other_providers() {
    let d = int_float();
    assert!(d.remove_backend("B", None).unwrap());
    assert!(!d.remove_backend("B", None).unwrap());
    assert_eq!(d.backend_names(), vec!["A"]);

    // a native nobody owns any more is simply foreign
    let x = FloatArray::new(vec![1.0], FloatWidth::F64);
    assert_eq!(d.resolve(&[&x]).unwrap().name(), "A");
}

#[test]
fn snapshots_do_not_see_later_mutations() {
    let d = int_float();
    let snapshot = d.snapshot();
    d.add_backend(Arc::new(GenericProvider("G")));
    d.set_precision(Precision::F32);

    assert_eq!(snapshot.names(), vec!["A", "B"]);
    assert_eq!(snapshot.precision(), Precision::MatchInput);
    assert_eq!(d.snapshot().len(), 3);
}

#[test]
fn dispatcher_from_registry() {
    let mut registry = Registry::new(ints());
    registry.add(floats());
    registry.set_default("B").unwrap();
    registry.set_precision(Precision::F64);

    let d = Dispatcher::from_registry(registry);
    assert_eq!(d.default_backend().name(), "B");
    assert_eq!(d.precision(), Precision::F64);
}

#[test]
fn concurrent_mutation_keeps_registry_valid() {
    let d = int_float();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..500 {
                let name = if i % 2 == 0 { "A" } else { "B" };
                d.set_default_backend(name).unwrap();
                d.set_precision(if i % 3 == 0 {
                    Precision::F32
                } else {
                    Precision::MatchInput
                });
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..500 {
                    let p = d.resolve(&[&1.0_f64]).unwrap();
                    assert!(p.name() == "A" || p.name() == "B");
                    assert!(d.get(d.default_backend().name()).is_some());
                }
            });
        }
    });

    assert_eq!(d.backend_names(), vec!["A", "B"]);
}

#[test]
fn rejected_mutation_keeps_published_snapshot() {
    let d = int_float();
    let before = d.snapshot();

    assert!(d.remove_backend("A", None).is_err());
    assert!(d.set_default_backend("tpu").is_err());
    assert!(Arc::ptr_eq(&before, &d.snapshot()));

    assert!(!d.add_backend(floats()));
    assert_eq!(d.snapshot().names(), before.names());

    let previous = d.set_precision(Precision::F32);
    assert_eq!(previous, Precision::MatchInput);
    assert_eq!(before.precision(), Precision::MatchInput);
    assert_eq!(d.precision(), Precision::F32);
}
