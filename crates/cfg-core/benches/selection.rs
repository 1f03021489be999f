//! Rule selection throughput: pattern matching over a realistic rule list.

use cfg_core::{select_rules, Rule, UrlPattern};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const URLS: [&str; 4] = [
    "https://www.site42.example/articles/2024/05/long-read?utm_source=feed",
    "https://mail.google.com/mail/u/0/#inbox",
    "http://cdn.unrelated.test/static/app.js",
    "https://shop.site7.example/cart",
];

fn rules(n: usize) -> Vec<Rule> {
    (0..n)
        .map(|i| Rule {
            id: format!("r{i}"),
            name: format!("rule {i}"),
            enabled: i % 7 != 0,
            pattern: match i % 3 {
                0 => format!("*://*.site{i}.example/*"),
                1 => format!("https://*/section{i}/*"),
                _ => "*://*/*".to_string(),
            },
            exclude_patterns: vec![format!("*://*.site{i}.example/login*")],
            priority: (i as i32 * 37) % 500,
            ..Rule::default()
        })
        .collect()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_rules");
    for n in [10usize, 100, 1000] {
        let list = rules(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &list, |b, list| {
            b.iter(|| {
                for url in URLS {
                    black_box(select_rules(black_box(list), url));
                }
            })
        });
    }
    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    c.bench_function("pattern_compile", |b| {
        b.iter(|| UrlPattern::compile(black_box("*://*.news.example.com/*/ads/*")))
    });

    let compiled = match UrlPattern::compile("*://*.news.example.com/*/ads/*") {
        Ok(p) => p,
        Err(e) => panic!("bench pattern must compile: {e}"),
    };
    c.bench_function("pattern_match_precompiled", |b| {
        b.iter(|| compiled.matches(black_box("https://a.news.example.com/x/ads/y")))
    });
}

criterion_group!(benches, bench_select, bench_compile);
criterion_main!(benches);
