use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ocspcheck::{
    encode_request, CertIdentity, EndpointResolver, ErrorCode, HashAlgorithm, ResponseCache, RevocationCheckError,
    ValidationResult,
};

fn cert_id(serial: u32) -> CertIdentity {
    CertIdentity {
        hash_algorithm: HashAlgorithm::Sha1,
        issuer_name_hash: vec![0x11; 20],
        issuer_key_hash: vec![0x22; 20],
        serial_number: serial.to_be_bytes().to_vec(),
    }
}

fn filled_cache(entries: u32) -> ResponseCache {
    let cache = ResponseCache::new();
    for serial in 0..entries {
        let id = cert_id(serial);
        let value = if serial % 4 == 0 {
            ValidationResult::failed(RevocationCheckError::new(ErrorCode::FetchFailure, "responder down"))
        } else {
            ValidationResult::validated(vec![0x30; 1500], vec![0x30; 1200], vec![0x30; 1400], id.clone())
        };
        cache.put(&id, value);
    }
    cache
}

fn benchmark_cache_get(c: &mut Criterion) {
    let cache = filled_cache(1000);
    c.bench_function("cache_get_hit", |b| b.iter(|| cache.get(black_box(&cert_id(500)))));
    c.bench_function("cache_get_miss", |b| b.iter(|| cache.get(black_box(&cert_id(5000)))));
}

fn benchmark_cache_put(c: &mut Criterion) {
    let cache = ResponseCache::new();
    let value = ValidationResult::failed(RevocationCheckError::new(ErrorCode::FetchFailure, "responder down"));
    let mut serial = 0u32;
    c.bench_function("cache_put", |b| {
        b.iter(|| {
            serial = (serial + 1) % 5000;
            cache.put(&cert_id(serial), value.clone());
        })
    });
}

fn benchmark_cache_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_serialize");
    for size in [10u32, 100, 1000] {
        let cache = filled_cache(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &cache, |b, cache| {
            b.iter(|| cache.serialize())
        });
    }
    group.finish();
}

fn benchmark_endpoint_resolution(c: &mut Criterion) {
    c.bench_function("reset_endpoint_relay", |b| {
        b.iter(|| {
            let mut resolver = EndpointResolver::new("com", true);
            resolver.reset_endpoint(black_box("acct.us-east-1.privatelink.snowflakecomputing.com"));
            resolver
        })
    });

    let mut resolver = EndpointResolver::default().with_cache_server_url("http://ocsp.relay.example:8080/ocsp_response_cache.json");
    resolver.reset_dynamic_cache_server_url();
    c.bench_function("generate_get_url", |b| {
        b.iter(|| resolver.generate_get_url(black_box("http://ocsp.digicert.com/ocsp"), black_box("MFEwTzBNMEswSTAJBgUrDgMCGgUABBQ/+==")))
    });
}

fn benchmark_request_encoding(c: &mut Criterion) {
    let id = cert_id(0x1234_5678);
    c.bench_function("encode_ocsp_request", |b| b.iter(|| encode_request(black_box(&id))));
}

criterion_group!(
    benches,
    benchmark_cache_get,
    benchmark_cache_put,
    benchmark_cache_serialize,
    benchmark_endpoint_resolution,
    benchmark_request_encoding
);
criterion_main!(benches);
