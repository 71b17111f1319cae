//! One transformer shared by many threads

mod common;

use common::*;
use graft_weaver::{
    AdviceBinding, DonorResolver, MixinDescription, ResolveError, TransformPlan, Transformer,
    TypeDescriptor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const ROUNDS: usize = 16;

/// Counts lookups so caching would show up
struct CountingResolver {
    inner: graft_weaver::InMemoryResolver,
    lookups: AtomicUsize,
}

impl DonorResolver for CountingResolver {
    fn resolve(&self, donor: &TypeDescriptor) -> Result<Vec<u8>, ResolveError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(donor)
    }
}

fn plan() -> TransformPlan {
    TransformPlan::new()
        .mixin(MixinDescription::new(TypeDescriptor::class(COUNTING)).with_initializer("bump"))
        .advice(AdviceBinding::new("greet", advice_ref("explode")))
}

#[test]
fn test_concurrent_transformations_agree() {
    let resolver = Arc::new(CountingResolver {
        inner: resolver(),
        lookups: AtomicUsize::new(0),
    });
    let transformer = Arc::new(Transformer::new(resolver.clone()));
    let expected = transformer.transform(&greeter(), &plan()).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let transformer = transformer.clone();
            thread::spawn(move || {
                let target = if i % 2 == 0 { greeter() } else { widget() };
                (0..ROUNDS)
                    .map(|_| transformer.transform(&target, &plan()).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let expected_widget = transformer.transform(&widget(), &plan()).unwrap();
    for (i, handle) in handles.into_iter().enumerate() {
        let outputs = handle.join().unwrap();
        let expected = if i % 2 == 0 { &expected } else { &expected_widget };
        assert!(outputs.iter().all(|out| out == expected));
    }

    assert_eq!(
        resolver.lookups.load(Ordering::SeqCst),
        THREADS * ROUNDS + 2
    );
}

#[test]
fn test_failures_do_not_leak_between_threads() {
    let transformer = Arc::new(Transformer::new(Arc::new(resolver())));
    let missing = TransformPlan::new().mixin(MixinDescription::new(TypeDescriptor::class(
        "demo/Nowhere",
    )));

    let failing = {
        let transformer = transformer.clone();
        thread::spawn(move || {
            (0..ROUNDS)
                .filter(|_| transformer.transform(&widget(), &missing).is_err())
                .count()
        })
    };
    let succeeding = {
        let transformer = transformer.clone();
        thread::spawn(move || {
            (0..ROUNDS)
                .filter(|_| transformer.transform(&widget(), &plan()).is_ok())
                .count()
        })
    };

    assert_eq!(failing.join().unwrap(), ROUNDS);
    assert_eq!(succeeding.join().unwrap(), ROUNDS);
}
