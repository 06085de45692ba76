//! Call overhead in both directions across the stack boundary.
//!
//! ```bash
//! cargo bench --bench call_benchmarks
//! cargo bench --features profiling --bench call_benchmarks
//! ```

use criterion::{Criterion, criterion_group, criterion_main};
use luastack::prelude::*;
use std::hint::black_box;

fn script(vm: &Vm, source: &str) -> Function {
    vm.load_buffer(source, None)
        .and_then(|chunk| chunk.call(()))
        .unwrap_or_else(|e| panic!("Failed to load benchmark script: {}", e))
}

fn rust_to_lua(c: &mut Criterion) {
    let vm = Vm::new().expect("Lua state");
    let mut group = c.benchmark_group("call/rust_to_lua");

    let noop = script(&vm, "return function() end");
    group.bench_function("void_no_args", |b| {
        b.iter(|| noop.call::<(), _>(()).unwrap())
    });

    let add = script(&vm, "return function(a, b) return a + b end");
    group.bench_function("two_integers", |b| {
        b.iter(|| add.call::<i64, _>((black_box(20i64), black_box(22i64))).unwrap())
    });

    let concat = script(&vm, "return function(a, b) return a .. b end");
    group.bench_function("two_strings", |b| {
        b.iter(|| {
            concat
                .call::<String, _>((black_box("left"), black_box("right")))
                .unwrap()
        })
    });

    let raise = script(&vm, "return function() error('bench') end");
    group.bench_function("lua_error", |b| {
        b.iter(|| raise.call::<(), _>(()).unwrap_err())
    });

    group.finish();
}

fn lua_to_rust(c: &mut Criterion) {
    let vm = Vm::new().expect("Lua state");
    let globals = vm.globals();
    let mut group = c.benchmark_group("call/lua_to_rust");

    globals
        .set("noop", Function::create(&vm, || {}, ()).expect("noop"))
        .expect("global");
    globals
        .set(
            "add",
            Function::create(&vm, |a: i64, b: i64| a + b, ()).expect("add"),
        )
        .expect("global");
    globals
        .set(
            "scaled",
            Function::create(&vm, |factor: f64, x: f64| factor * x, (2.5f64,)).expect("scaled"),
        )
        .expect("global");
    globals
        .set(
            "fail",
            Function::create(&vm, || -> Result<(), String> { Err("bench".into()) }, ())
                .expect("fail"),
        )
        .expect("global");

    let cases = [
        ("void_no_args", "return function(n) for _ = 1, n do noop() end end"),
        ("two_integers", "return function(n) for i = 1, n do add(i, i) end end"),
        ("captured_upvalue", "return function(n) for i = 1, n do scaled(i) end end"),
        ("native_error", "return function(n) for _ = 1, n do pcall(fail) end end"),
    ];
    for (name, source) in cases {
        let driver = script(&vm, source);
        group.bench_function(name, |b| {
            b.iter(|| driver.call::<(), _>((black_box(100i64),)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, rust_to_lua, lua_to_rust);
criterion_main!(benches);
