use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use mwtext::{
    expander::{ExpandOptions, Expander},
    resolver::DictResolver,
    scanner, style,
    siteinfo::SiteInfo,
    uniq::Uniquifier,
    utils,
};
use rand::{Rng, SeedableRng};

/// Random text with wiki markup sprinkled in at random places.
fn generate_wikitext(length: u64, values: &[&str]) -> String {
    // generate inputs from fixed seeds
    let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(length); /* define specific algorithm to ensure reproducibility */
    let mut input = String::new();
    for _ in 0..length {
        input.push(rng.gen_range('a'..='z'));
        if rng.gen_ratio(1, 6) {
            input.push(' ');
        }
    }

    for _ in 0..(length / 10) {
        let mut pos = rng.gen_range(0..input.len());
        while !input.is_char_boundary(pos) {
            pos = rng.gen_range(0..input.len());
        }

        let value = values[rng.gen_range(0..values.len())];
        input.insert_str(pos, value);
    }

    input
}

const MARKUP: &[&str] = &[
    "\n", "\n\n", "\n* ", "\n== ", " ==\n", "''", "'''", "'''''", "[[", "]]", "[[Datei:", "{|\n",
    "\n|-\n", "\n|}\n", "|", "!!", "&amp;", "&#x41;", "&nbsp;", "<br/>", "<b>", "</b>",
    "http://example.org/", "__TOC__", "<!-- x -->", "<nowiki>[[x]]</nowiki>", "<ref>a</ref>",
];

const TEMPLATES: &[&str] = &[
    "{{Hallo}}",
    "{{Hallo|Du}}",
    "{{Infobox|titel=x|typ=b}}",
    "{{#if: {{{1|}}} | ja | nein}}",
    "{{#switch: c | a = 1 | b = 2 | #default = 3}}",
    "{{#expr: 2 * (3 + 4) ^ 2 mod 5}}",
    "{{#time: d. F Y | 2008-03-04}}",
    "{{PAGENAME}}",
    "{{lc:ÄÖÜ}}",
];

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    for length in [1000u64, 10000u64, 100000u64].into_iter() {
        let input = generate_wikitext(length, MARKUP);
        group.bench_with_input(BenchmarkId::from_parameter(length), &input, |b, i| {
            b.iter(|| scanner::scan(i));
        });
    }
}

fn bench_replace_tags(c: &mut Criterion) {
    let mut group = c.benchmark_group("replace_tags");
    for length in [1000u64, 10000u64, 100000u64].into_iter() {
        let input = generate_wikitext(length, MARKUP);
        group.bench_with_input(BenchmarkId::from_parameter(length), &input, |b, i| {
            b.iter(|| {
                let mut uniq = Uniquifier::with_nonce("benchmark");
                uniq.replace_tags(i)
            });
        });
    }
}

fn bench_expand(c: &mut Criterion) {
    let site_info = SiteInfo::builtin("de").expect("bundled site info");
    let resolver = DictResolver::new(site_info)
        .with_page("Vorlage:Hallo", "Hallo {{{1|Welt}}}!")
        .with_page(
            "Vorlage:Infobox",
            "{|\n! {{{titel}}}\n|-\n| {{#switch: {{{typ}}} | a = Eins | b = Zwei }}\n|}",
        );

    let mut group = c.benchmark_group("expand");
    for length in [1000u64, 10000u64, 100000u64].into_iter() {
        let input = generate_wikitext(length, TEMPLATES);
        group.bench_with_input(BenchmarkId::from_parameter(length), &input, |b, i| {
            b.iter(|| {
                let mut uniq = Uniquifier::with_nonce("benchmark");
                let options = ExpandOptions {
                    title: Some("Benchmark".to_string()),
                    ..ExpandOptions::default()
                };
                Expander::new(&resolver, &mut uniq, options).expand(i)
            });
        });
    }
}

fn bench_style(c: &mut Criterion) {
    let mut group = c.benchmark_group("style_analyze");
    for length in [10u64, 50u64, 200u64].into_iter() {
        let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(length);
        let counts: Vec<u32> = (0..length).map(|_| rng.gen_range(2..=5)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(length), &counts, |b, i| {
            b.iter(|| style::analyze(i));
        });
    }
}

fn bench_case_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_lowercase");
    for length in [100u64, 1000u64, 10000u64].into_iter() {
        let input = generate_wikitext(length, &["Ä", "ẞ", "Σ", "İ", "Ǆ"]);
        group.bench_with_input(BenchmarkId::new("Std", length), &input, |b, i| {
            b.iter(|| i.to_lowercase());
        });
        group.bench_with_input(BenchmarkId::new("Optimized", length), &input, |b, i| {
            b.iter(|| utils::to_lowercase_opt(i));
        });
    }
}

criterion_group!(
    benches,
    bench_scan,
    bench_replace_tags,
    bench_expand,
    bench_style,
    bench_case_mapping
);
criterion_main!(benches);
