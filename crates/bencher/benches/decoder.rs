use std::hint::black_box;

use bencher::{TestCase, TestFile};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use micro_h1::codec::{HeaderDecoder, PayloadDecoder};
use micro_h1::config::EngineConfig;
use micro_h1::pool::RequestBuffers;
use micro_h1::protocol::PayloadItem;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static SMALL_HEADER: TestFile = TestFile::new("get_small.txt", include_str!("../resources/request/get_small.txt"));
static LARGE_HEADER: TestFile = TestFile::new("get_large.txt", include_str!("../resources/request/get_large.txt"));
static CHUNKED_BODY: TestFile = TestFile::new("post_chunked.txt", include_str!("../resources/request/post_chunked.txt"));

fn head_cases() -> Vec<TestCase> {
    vec![TestCase::new("small_head", SMALL_HEADER), TestCase::new("large_head", LARGE_HEADER)]
}

fn benchmark_head_decoder(criterion: &mut Criterion) {
    let config = EngineConfig::default();
    let mut group = criterion.benchmark_group("head_decoder");

    for case in head_cases() {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            let mut buffers = RequestBuffers::new(&config);
            b.iter_batched_ref(
                || BytesMut::from(case.file().content()),
                |bytes_mut| {
                    let head = HeaderDecoder::new(&mut buffers, config.max_head_bytes)
                        .decode(bytes_mut)
                        .expect("input should be a valid request head")
                        .unwrap();
                    black_box(head);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_pipelined_heads(criterion: &mut Criterion) {
    let config = EngineConfig::default();
    let case = TestCase::new("small_head_x16", SMALL_HEADER);
    let input = case.pipelined(16);

    let mut group = criterion.benchmark_group("pipelined_heads");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.bench_function(case.name(), |b| {
        let mut buffers = RequestBuffers::new(&config);
        b.iter_batched_ref(
            || BytesMut::from(&input[..]),
            |bytes_mut| {
                let mut decoder = HeaderDecoder::new(&mut buffers, config.max_head_bytes);
                while let Some(head) = decoder.decode(bytes_mut).expect("input should be valid request heads") {
                    black_box(head);
                }
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn benchmark_chunked_body(criterion: &mut Criterion) {
    let body = &CHUNKED_BODY.content()[CHUNKED_BODY.head_len()..];

    let mut group = criterion.benchmark_group("body_decoder");
    group.throughput(Throughput::Bytes(body.len() as u64));
    group.bench_function(CHUNKED_BODY.file_name(), |b| {
        b.iter_batched_ref(
            || BytesMut::from(body),
            |bytes_mut| {
                let mut decoder = PayloadDecoder::chunked();
                while let Some(PayloadItem::Chunk(bytes)) = decoder.decode(bytes_mut).expect("input should be a valid chunked body") {
                    black_box(bytes);
                }
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(decoder, benchmark_head_decoder, benchmark_pipelined_heads, benchmark_chunked_body);
criterion_main!(decoder);
