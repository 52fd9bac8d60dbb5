use std::fs;
use std::io;

use mzstore::io::mzml::DocumentVariant;
use mzstore::{
    DissociationType, InMemoryScanStore, MassAnalyzerType, MzMLScanStore, MzMLWriter,
    PrecursorInfo, ScanAccessError, ScanPolarity, ScanRecord, ScanStore, Spectrum, WriterConfig,
};

fn vendor_store() -> InMemoryScanStore {
    let survey = ScanRecord::new_ms1(
        1,
        "first spectrum".to_string(),
        ScanPolarity::Positive,
        false,
        0.25,
        Spectrum::new(
            vec![204.08, 366.14, 512.2004, 1021.5],
            vec![1200.0, 54.5, 8e5, 3.25],
        )
        .unwrap(),
    )
    .with_scan_filter("FTMS + p ESI Full ms [200.00-2000.00]");
    let precursor = PrecursorInfo::new("first spectrum".to_string(), 512.2004, 2, 8e5)
        .with_dissociation(DissociationType::CID);
    let product = ScanRecord::new_msn(
        2,
        "second spectrum".to_string(),
        2,
        ScanPolarity::Positive,
        true,
        0.2625,
        precursor,
        Spectrum::new(vec![147.1128, 175.119, 276.155], vec![10.0, 99.5, 0.1]).unwrap(),
    )
    .with_scan_filter("ITMS + c ESI d Full ms2 512.20@cid35.00 [140.00-1035.00]");
    InMemoryScanStore::new(vec![survey, product]).with_instrument("Thermo Scientific", "LTQ Orbitrap")
}

fn written_document(store: &mut InMemoryScanStore) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    MzMLWriter::new(WriterConfig::default()).write_store(store, &mut buffer)?;
    Ok(buffer)
}

#[test_log::test]
fn round_trip_through_file() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("vendor.mzML");
    let mut source = vendor_store();
    MzMLWriter::default().write_to_path(&mut source, &path)?;

    let mut reader = MzMLScanStore::new(&path).with_cache(true);
    reader.open()?;
    assert_eq!(reader.variant(), Some(DocumentVariant::IndexWrapped));
    assert_eq!(reader.first_index()?, source.first_index()?);
    assert_eq!(reader.last_index()?, source.last_index()?);

    for index in source.first_index()?..=source.last_index()? {
        let expected = source.scan(index)?;
        let observed = reader.scan(index)?;
        assert_eq!(expected.id, observed.id);
        assert_eq!(expected.ms_order, observed.ms_order);
        assert_eq!(expected.centroid, observed.centroid);
        assert_eq!(expected.polarity, observed.polarity);
        assert_eq!(expected.retention_time, observed.retention_time);
        assert_eq!(expected.spectrum.masses(), observed.spectrum.masses());
        assert_eq!(expected.spectrum.intensities(), observed.spectrum.intensities());
    }

    assert_eq!(reader.analyzer(1)?, MassAnalyzerType::Orbitrap);
    assert_eq!(reader.analyzer(2)?, MassAnalyzerType::IonTrap2D);
    assert_eq!(reader.dissociation_type(2)?, DissociationType::CID);
    assert_eq!(reader.parent_index(2)?, 1);
    Ok(())
}

#[test_log::test]
fn offsets_point_at_spectra() -> io::Result<()> {
    let document = written_document(&mut vendor_store())?;
    let mut reader = MzMLScanStore::from_bytes("vendor", document.clone());
    reader.open()?;
    let offsets = reader.offset_index().expect("an offset index");
    assert_eq!(offsets.len(), 2);
    for (id, offset) in offsets.iter() {
        let tail = &document[*offset as usize..];
        assert!(tail.starts_with(b"<spectrum "));
        let opening = String::from_utf8_lossy(&tail[..tail.iter().position(|b| *b == b'>').unwrap()]);
        assert!(opening.contains(&format!("id=\"{id}\"")));
    }
    Ok(())
}

#[test_log::test]
fn bare_and_indexed_agree() -> io::Result<()> {
    let document = String::from_utf8(written_document(&mut vendor_store())?).unwrap();
    let start = document.find("<mzML ").unwrap();
    let end = document.find("</mzML>").unwrap() + "</mzML>".len();
    let bare = document[start..end].to_string();

    let mut indexed = MzMLScanStore::from_bytes("indexed", document.into_bytes());
    let mut stripped = MzMLScanStore::from_bytes("bare", bare.into_bytes());
    indexed.open()?;
    stripped.open()?;
    assert!(indexed.is_indexed());
    assert!(!stripped.is_indexed());
    let a: Vec<ScanRecord> = indexed.iter().collect::<Result<_, _>>()?;
    let b: Vec<ScanRecord> = stripped.iter().collect::<Result<_, _>>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test_log::test]
fn rewriting_a_read_document_is_stable() -> io::Result<()> {
    let first = written_document(&mut vendor_store())?;
    let mut reader = MzMLScanStore::from_bytes("first", first.clone());
    let mut second = Vec::new();
    MzMLWriter::default().write_store(&mut reader, &mut second)?;
    assert_eq!(first, second);
    Ok(())
}

#[test_log::test]
fn bounds_and_missing_precursor() -> io::Result<()> {
    let document = written_document(&mut vendor_store())?;
    let mut reader = MzMLScanStore::from_bytes("vendor", document);
    assert!(matches!(reader.scan(1), Err(ScanAccessError::StoreNotOpen)));
    reader.open()?;
    let first = reader.first_index()?;
    let last = reader.last_index()?;
    assert!(matches!(
        reader.scan(first - 1),
        Err(ScanAccessError::IndexOutOfRange { .. })
    ));
    assert!(matches!(
        reader.scan(last + 1),
        Err(ScanAccessError::IndexOutOfRange { .. })
    ));
    assert!(reader.scan(first).is_ok());
    assert!(reader.scan(last).is_ok());

    assert!(reader.precursor_mz(first).unwrap_err().is_not_found());
    assert!(reader.precursor_charge(first).unwrap_err().is_not_found());
    assert!(reader.precursor_id(first).unwrap_err().is_not_found());
    assert!(reader.dissociation_type(first).unwrap_err().is_not_found());
    Ok(())
}

#[test_log::test]
fn write_beside_names_output_after_source() -> io::Result<()> {
    let dir = tempfile::tempdir()?;
    let raw = dir.path().join("run_0042.raw");
    fs::write(&raw, b"")?;
    let mut store = InMemoryScanStore::from_source(&raw, vendor_store().into_records());
    let out_dir = dir.path().join("converted");
    fs::create_dir(&out_dir)?;
    let written = MzMLWriter::default().write_beside(&mut store, &raw, &out_dir)?;
    assert_eq!(written, out_dir.join("run_0042.mzML"));
    assert!(written.exists());
    Ok(())
}
