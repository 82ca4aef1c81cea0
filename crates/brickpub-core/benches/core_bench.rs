use brickpub_core::data::Where;
use brickpub_core::message::{MessageBucket, MessageDispatcher, MessageLevel, UserMessage};
use brickpub_core::service::{ColorTable, StaticColorTable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_color_lookup(c: &mut Criterion) {
    let table = StaticColorTable::new();
    c.bench_function("color_lookup/core_codes", |b| {
        b.iter(|| {
            for code in [0u32, 4, 7, 14, 15, 71, 72] {
                black_box(table.entry(black_box(code)));
            }
        })
    });
}

fn bench_message_dispatch(c: &mut Criterion) {
    c.bench_function("message_dispatch/1k_unique", |b| {
        b.iter(|| {
            let dispatcher = MessageDispatcher::new();
            for line in 0..1000 {
                dispatcher.dispatch(UserMessage::at(
                    MessageBucket::Parse,
                    MessageLevel::Warning,
                    Where::new("main.ldr", 0, line),
                    "bad field count",
                ));
            }
            black_box(dispatcher.total());
        })
    });
}

fn bench_message_dedupe(c: &mut Criterion) {
    c.bench_function("message_dispatch/1k_duplicates", |b| {
        b.iter(|| {
            let dispatcher = MessageDispatcher::new();
            let loc = Where::new("main.ldr", 0, 5);
            for _ in 0..1000 {
                dispatcher.dispatch(UserMessage::at(
                    MessageBucket::Parse,
                    MessageLevel::Warning,
                    loc.clone(),
                    "bad field count",
                ));
            }
            black_box(dispatcher.total());
        })
    });
}

criterion_group!(
    benches,
    bench_color_lookup,
    bench_message_dispatch,
    bench_message_dedupe
);
criterion_main!(benches);
