use chrono::{Duration, TimeZone, Utc};
use std::sync::Mutex;
use tempfile::tempdir;
use tsmap_batch::{load_chunk_manifest, run_chunks, ChunkingConfig};
use tsmap_core::{EquipmentKind, EquipmentVariable, MappingConfig, MappingKey};
use tsmap_ts::{ComputationRange, InMemoryTimeSeriesStore, MappingConfigStats, TimeSeriesIndex};

fn store() -> InMemoryTimeSeriesStore {
    let index = TimeSeriesIndex::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        Duration::minutes(15),
        10,
    );
    let mut store = InMemoryTimeSeriesStore::new();
    store
        .insert("load", index, 1, (1..=10).map(f64::from).collect())
        .unwrap();
    store
}

fn mapping() -> MappingConfig {
    let mut config = MappingConfig::new();
    config
        .bind(
            EquipmentKind::Load,
            "load",
            MappingKey::new(EquipmentVariable::P0, "LOAD_A").unwrap(),
            None,
        )
        .unwrap();
    config
}

#[test]
fn chunk_sums_add_up_to_the_full_range() {
    let store = store();
    let mapping = mapping();
    let dir = tempdir().unwrap();
    let config = ChunkingConfig {
        chunk_size: 4,
        threads: 2,
        manifest_path: Some(dir.path().join("chunk_manifest.json")),
        ..ChunkingConfig::default()
    };

    let range = ComputationRange::check(Some(config.computation_range().unwrap()), &store).unwrap();
    assert_eq!(range.point_count(), 10);
    let cutter = config.cutter(&range).unwrap();
    assert_eq!(cutter.chunk_count(), 3);

    let sums = Mutex::new(Vec::new());
    let summary = run_chunks(&config, &cutter, |chunk| {
        let chunk_range = chunk.computation_range(range.versions())?;
        let stats = MappingConfigStats::new(&store, &mapping, &chunk_range);
        let sum = stats.sum("load")?;
        sums.lock().unwrap().push((chunk.index, sum));
        Ok(())
    })
    .unwrap();

    assert_eq!(summary.success, 3);
    assert_eq!(summary.failure, 0);
    let mut sums = sums.into_inner().unwrap();
    sums.sort_by_key(|(index, _)| *index);
    assert_eq!(sums, vec![(0, 10.0), (1, 26.0), (2, 19.0)]);

    let manifest = load_chunk_manifest(summary.manifest_path.as_deref().unwrap()).unwrap();
    assert_eq!(manifest.num_chunks, 3);
    assert_eq!(manifest.chunk_size, 4);
    let last = &manifest.chunks[2];
    assert_eq!((last.lower, last.upper, last.points), (8, 9, 2));
}

#[test]
fn failing_chunks_land_in_the_manifest() {
    let store = store();
    let mapping = mapping();
    let dir = tempdir().unwrap();
    let config = ChunkingConfig {
        chunk_size: 5,
        threads: 1,
        manifest_path: Some(dir.path().join("out").join("manifest.json")),
        ..ChunkingConfig::default()
    };
    let range = ComputationRange::check(None, &store).unwrap();
    let cutter = config.cutter(&range).unwrap();

    let summary = run_chunks(&config, &cutter, |chunk| {
        let chunk_range = chunk.computation_range(range.versions())?;
        let stats = MappingConfigStats::new(&store, &mapping, &chunk_range);
        let name = if chunk.index == 0 { "load" } else { "missing" };
        stats.max(name)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(summary.success, 1);
    assert_eq!(summary.failure, 1);
    let manifest = load_chunk_manifest(summary.manifest_path.as_deref().unwrap()).unwrap();
    assert_eq!(manifest.failure, 1);
    let failed = &manifest.chunks[1];
    assert_eq!(failed.status, "error");
    assert!(failed.error.as_deref().unwrap().contains("missing"));
}
