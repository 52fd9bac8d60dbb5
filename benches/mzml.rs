use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mzstore::{
    InMemoryScanStore, MzMLScanStore, MzMLWriter, PrecursorInfo, ScanPolarity, ScanRecord,
    ScanStore, Spectrum,
};

const N_SCANS: usize = 200;
const N_PEAKS: usize = 500;

fn generate_document() -> Vec<u8> {
    let mut store = InMemoryScanStore::default();
    let mut last_survey = String::new();
    for i in 0..N_SCANS {
        let masses: Vec<f64> = (0..N_PEAKS).map(|j| 100.0 + j as f64 * 1.5).collect();
        let intensities: Vec<f64> = (0..N_PEAKS).map(|j| ((i + j) % 97) as f64 * 10.0).collect();
        let spectrum = Spectrum::new(masses, intensities).unwrap();
        let id = format!("scan={}", i + 1);
        let time = i as f64 * 0.01;
        let record = if i % 5 == 0 {
            last_survey = id.clone();
            ScanRecord::new_ms1(i + 1, id, ScanPolarity::Positive, false, time, spectrum)
        } else {
            let precursor = PrecursorInfo::new(last_survey.clone(), 450.0, 2, 1e4);
            ScanRecord::new_msn(i + 1, id, 2, ScanPolarity::Positive, true, time, precursor, spectrum)
        };
        store.push(record);
    }
    let mut buffer = Vec::new();
    MzMLWriter::default()
        .write_store(&mut store, &mut buffer)
        .unwrap();
    buffer
}

fn serial(document: &[u8], cache: bool) {
    let mut store = MzMLScanStore::from_bytes("bench", document.to_vec()).with_cache(cache);
    store.open().unwrap();
    let total: usize = store.iter().map(|s| s.unwrap().spectrum.len()).sum();
    assert_eq!(total, N_SCANS * N_PEAKS);
}

fn retention_time_lookup(document: &[u8]) {
    let mut store = MzMLScanStore::from_bytes("bench", document.to_vec());
    store.open().unwrap();
    let index = store.index_for_retention_time((N_SCANS - 1) as f64 * 0.01).unwrap();
    assert_eq!(index, N_SCANS);
}

fn mzml_totaling(c: &mut Criterion) {
    let document = generate_document();
    c.bench_function("serial_execution", |b| {
        b.iter(|| serial(black_box(&document), false))
    });
    c.bench_function("serial_execution_with_cache", |b| {
        b.iter(|| serial(black_box(&document), true))
    });
    c.bench_function("retention_time_lookup", |b| {
        b.iter(|| retention_time_lookup(black_box(&document)))
    });
}

criterion_group!(benches, mzml_totaling);
criterion_main!(benches);
