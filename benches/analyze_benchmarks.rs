/// Performance benchmarks for read analysis
///
/// Run with: cargo bench
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use isomirgff::analyze::analyze_record;
use isomirgff::context::{Config, RunContext};
use isomirgff::intersect::IntersectedRecord;
use isomirgff::isomir::tune;
use isomirgff::reference::{MatureCoord, MatureMap, PrecursorMap};
use isomirgff::sequence::make_id;
use isomirgff::store::Aggregator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const LET7: &str = "TGGGATGAGGTAGTAGGTTGTATAGTTTTAGGGTCACACCCACCACTGGGAGATAACTATACAATCTACTGTCTTTCCTA";

/// Reads drawn around the 5p mature with random trimming, tails and SNVs
fn synthetic_reads(n: usize) -> Vec<(i64, String)> {
    let mut rng = StdRng::seed_from_u64(42);
    let bases = b"ACGT";
    (0..n)
        .map(|_| {
            let start: usize = rng.gen_range(3..8);
            let len: usize = rng.gen_range(18..25);
            let mut seq: Vec<u8> = LET7.as_bytes()[start..start + len].to_vec();
            if rng.gen_bool(0.3) {
                let pos = rng.gen_range(0..seq.len());
                seq[pos] = bases[rng.gen_range(0..4)];
            }
            for _ in 0..rng.gen_range(0..3) {
                seq.push(bases[rng.gen_range(0..4)]);
            }
            (start as i64, String::from_utf8(seq).unwrap())
        })
        .collect()
}

fn bench_tune(c: &mut Criterion) {
    let reads = synthetic_reads(1000);
    let mut group = c.benchmark_group("tune");
    group.throughput(Throughput::Elements(reads.len() as u64));
    group.bench_function("let7_reads", |b| {
        b.iter(|| {
            for (start, seq) in &reads {
                black_box(tune(seq, LET7, *start));
            }
        })
    });
    group.finish();
}

fn bench_make_id(c: &mut Criterion) {
    let reads = synthetic_reads(1000);
    c.bench_function("make_id", |b| {
        b.iter(|| {
            for (_, seq) in &reads {
                black_box(make_id(seq).unwrap());
            }
        })
    });
}

fn bench_analyze_and_aggregate(c: &mut Criterion) {
    let mut precursors = PrecursorMap::new();
    precursors.insert("hsa-let-7a-1", LET7);
    let mut matures = MatureMap::new();
    matures.insert(
        "hsa-let-7a-1",
        MatureCoord {
            name: "hsa-let-7a-5p".into(),
            start: 6,
            end: 27,
        },
    );

    let mut group = c.benchmark_group("analyze");
    for size in [100, 1000, 10000].iter() {
        let records: Vec<IntersectedRecord> = synthetic_reads(*size)
            .into_iter()
            .enumerate()
            .map(|(i, (start, seq))| {
                let pos = 1000 + start - 1;
                let line = format!(
                    "chr9\t{pos}\t{}\tread{i}\t{seq}\t+\t3\tchr9\t.\tmiRNA_primary_transcript\t1000\t1079\t.\t+\t.\tID=MI0000060;Name=hsa-let-7a-1\t{}",
                    pos + seq.len() as i64 - 1,
                    seq.len()
                );
                IntersectedRecord::parse(&line, i + 1).unwrap()
            })
            .collect();

        for add_extra in [false, true] {
            let config = Config {
                add_extra,
                ..Config::default()
            };
            let ctx = RunContext::new(&config, &precursors, &matures, "bench");
            let id = format!("{size}/extra={add_extra}");
            group.throughput(Throughput::Elements(*size as u64));
            group.bench_with_input(BenchmarkId::from_parameter(id), &records, |b, records| {
                b.iter(|| {
                    let mut aggregator = Aggregator::new();
                    for record in records {
                        aggregator.push_analysis(analyze_record(record, &ctx).unwrap());
                    }
                    black_box(aggregator.len())
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_tune, bench_make_id, bench_analyze_and_aggregate);
criterion_main!(benches);
