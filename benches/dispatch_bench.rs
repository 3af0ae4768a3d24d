use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rbgate::guest::{self, Value};
use rbgate::protect::{self, Job};
use rbgate::{ArgsSpec, BridgeConfig, RbObject, Registry, vm};

const DEPTHS: &[usize] = &[1, 4, 16];

struct Hierarchy {
    leaf: RbObject,
    chain: Vec<Value>,
}

/// Builds `depth` classes below a root that defines `bench_target`.
fn hierarchy(depth: usize) -> Hierarchy {
    let object = guest::core_classes().object;
    let root = protect::protect_object(Job::DefineClass {
        outer: object,
        name: &format!("BenchRoot{}", depth),
        superclass: object,
    })
    .expect("define root");
    Registry::register_instance_method(&root, "bench_target", ArgsSpec::new(), |_, _| Ok(RbObject::nil()))
        .expect("register");

    let mut leaf = root;
    for level in 0..depth {
        leaf = protect::protect_object(Job::DefineClass {
            outer: object,
            name: &format!("BenchLevel{}x{}", depth, level),
            superclass: leaf.value(),
        })
        .expect("define level");
    }
    let chain = guest::class::ancestors(leaf.value());
    Hierarchy { leaf, chain }
}

fn bench_lookup(c: &mut Criterion) {
    vm::setup_with(BridgeConfig::default()).expect("interpreter setup");
    let method = guest::intern("bench_target");

    let mut group = c.benchmark_group("dispatch/lookup");
    for &depth in DEPTHS {
        let Hierarchy { leaf, chain } = hierarchy(depth);
        group.bench_with_input(BenchmarkId::new("cached", depth), &chain, |b, chain| {
            b.iter(|| black_box(Registry::lookup(black_box(chain), method)))
        });
        group.bench_with_input(BenchmarkId::new("uncached", depth), &chain, |b, chain| {
            b.iter(|| black_box(Registry::lookup_uncached(black_box(chain), method)))
        });

        let instance = leaf.call("new", &[]).expect("instance");
        group.bench_with_input(BenchmarkId::new("guest_call", depth), &instance, |b, instance| {
            b.iter(|| black_box(instance.call("bench_target", &[]).expect("call")))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lookup);
criterion_main!(benches);
