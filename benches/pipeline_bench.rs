use criterion::{black_box, criterion_group, criterion_main, Criterion};
use htmlshot::geometry::{parse_dimension, GeometryHints, GeometryPlan};
use htmlshot::markup::extract_html;
use htmlshot::storage::{object_key, validate_key};
use htmlshot::RenderRequest;

fn bench_extract_html(c: &mut Criterion) {
    let body = "<div class=\"row\"><span>cell</span></div>\n".repeat(500);
    let fenced = format!("Here is the report:\n```html\n{}```\nLet me know.", body);

    let mut group = c.benchmark_group("extract_html");
    group.bench_function("fenced", |b| b.iter(|| extract_html(black_box(&fenced)).len()));
    group.bench_function("plain", |b| b.iter(|| extract_html(black_box(&body)).len()));
    group.finish();
}

fn bench_request_preparation(c: &mut Criterion) {
    c.bench_function("parse_and_plan", |b| {
        b.iter(|| {
            let width = parse_dimension("width", black_box(Some("1280"))).unwrap();
            let height = parse_dimension("height", black_box(None)).unwrap();
            let plan = GeometryPlan::from_hints(GeometryHints { width, height }).unwrap();
            plan.resolve(|| Ok(800)).unwrap()
        })
    });

    c.bench_function("request_hints", |b| {
        let request = RenderRequest::new("<p>x</p>").with_height(600);
        b.iter(|| GeometryPlan::from_hints(black_box(&request).hints()).unwrap().needs_measurement())
    });

    c.bench_function("object_key", |b| {
        b.iter(|| object_key(black_box(None), black_box("report")).unwrap())
    });

    c.bench_function("validate_key", |b| {
        b.iter(|| validate_key(black_box("reports/2025/04/daily-summary.png")).is_ok())
    });
}

criterion_group!(benches, bench_extract_html, bench_request_preparation);
criterion_main!(benches);
