//! Benchmarks for the per-turn hot path that runs without tool calls:
//! rule classification, reference resolution and tool planning.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;
use waypoint_chat::{ConversationContext, IntentClassifier, Planner, ReferenceResolver, SearchMemory};
use waypoint_core::types::{Coordinates, PlaceRecord, SearchType};
use waypoint_geo::GeoBiasResolver;

const UTTERANCES: [&str; 8] = [
    "Italian restaurants in Ijburglaan",
    "How far are they from Dam Square?",
    "How many restaurants are in Amsterdam?",
    "directions from Times Square to Central Park",
    "What are the coordinates of Buckingham Palace?",
    "show them on a map",
    "what's at 48.8584, 2.2945",
    "Hello, what can you do?",
];

fn context_with_results(count: usize) -> ConversationContext {
    let places = (0..count)
        .map(|i| PlaceRecord {
            name: format!("Restaurant {}", i),
            coordinates: Coordinates::new(52.35 + i as f64 * 0.001, 4.99),
            category: "restaurant".to_string(),
            source_query_id: Uuid::new_v4(),
        })
        .collect();
    let mut ctx = ConversationContext::new("bench-user");
    ctx.apply_search_memory(SearchMemory::from_results(
        SearchType::Search,
        places,
        Some(Coordinates::new(52.3546, 4.9930)),
    ));
    ctx
}

fn bench_classify_rules(c: &mut Criterion) {
    let classifier = IntentClassifier::new(0.6, Duration::from_secs(2));
    c.bench_function("classify_rules_mixed", |b| {
        b.iter(|| {
            for text in UTTERANCES {
                black_box(classifier.classify_rules(black_box(text)));
            }
        })
    });
}

fn bench_resolve_references(c: &mut Criterion) {
    let resolver = ReferenceResolver::new(1);
    let ctx = context_with_results(10);
    c.bench_function("resolve_references_10_places", |b| {
        b.iter(|| {
            for text in UTTERANCES {
                black_box(resolver.resolve(black_box(text), &ctx));
            }
        })
    });
}

fn bench_geo_bias(c: &mut Criterion) {
    let geo = GeoBiasResolver::builtin();
    c.bench_function("geo_bias_resolve", |b| {
        b.iter(|| {
            for token in ["Paris Central", "IJburglaan", "paris texas", "Zzyzx", "the Eiffel Tower"] {
                black_box(geo.resolve(black_box(token)));
            }
        })
    });
}

fn bench_plan(c: &mut Criterion) {
    let classifier = IntentClassifier::new(0.6, Duration::from_secs(2));
    let resolver = ReferenceResolver::new(1);
    let planner = Planner::new(GeoBiasResolver::builtin(), 5);
    let ctx = context_with_results(5);
    let text = "How far are they from Dam Square?";
    let refs = resolver.resolve(text, &ctx);
    let decision = classifier
        .classify_rules(&refs.resolved_query_text)
        .expect("directions rule matches");

    c.bench_function("plan_matrix_follow_up", |b| {
        b.iter(|| black_box(planner.plan(black_box(&decision), &refs)))
    });
}

criterion_group!(
    benches,
    bench_classify_rules,
    bench_resolve_references,
    bench_geo_bias,
    bench_plan
);
criterion_main!(benches);
