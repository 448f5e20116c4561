//! Benchmark: parse, validate and dump throughput on generated configs

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ngxconf_parser::{Style, parse, serialize, validate};

/// An http block with `servers` virtual hosts and one upstream per host
fn generate(servers: usize) -> String {
    let mut out = String::from("events {\n    worker_connections 1024;\n}\nhttp {\n");
    out.push_str("    limit_req_zone $binary_remote_addr zone=perip:10m rate=10r/s;\n");
    for i in 0..servers {
        out.push_str(&format!(
            "    upstream backend{i} {{\n        server 10.0.{}.1:8080 weight=2;\n        server 10.0.{}.2:8080 backup;\n    }}\n",
            i % 256,
            i % 256
        ));
        out.push_str(&format!(
            "    server {{\n        listen 80; # plain\n        server_name host{i}.example.com;\n        location / {{\n            proxy_pass http://backend{i};\n            proxy_set_header Host $host;\n        }}\n        location ~* \\.(png|css)$ {{\n            expires 7d;\n        }}\n    }}\n"
        ));
    }
    out.push_str("}\n");
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for servers in [10, 100, 1000] {
        let source = generate(servers);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(servers), &source, |b, s| {
            b.iter(|| parse(black_box(s)).unwrap())
        });
    }
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let config = parse(&generate(500)).unwrap();
    c.bench_function("validate_500_servers", |b| {
        b.iter(|| validate(black_box(&config)))
    });
}

fn bench_serialize(c: &mut Criterion) {
    let config = parse(&generate(500)).unwrap();
    let style = Style::default();
    c.bench_function("serialize_500_servers", |b| {
        b.iter(|| serialize(black_box(&config), &style))
    });
}

criterion_group!(benches, bench_parse, bench_validate, bench_serialize);
criterion_main!(benches);
