//! Behaviour that differs between engines: capabilities, storage layout
//! parameters, removal and the chunk cache.

use obs_engines::{
    CapabilityMask, EngineConfig, EngineFactory, EngineKind, ErrorKind, Selection,
    VariableCreationParams, UNLIMITED,
};
use test_utils::{assert_error_kind, engine, factory, init_test_tracing, ramp_f32};

// ============================================================================
// Capabilities and creation parameters
// ============================================================================

#[test]
fn test_capabilities() {
    let store = engine(EngineKind::ObsStore).capabilities().unwrap();
    assert_eq!(store.can_chunk, CapabilityMask::Ignored);
    assert_eq!(store.can_compress_with_gzip, CapabilityMask::Ignored);
    assert_eq!(store.can_compress_with_szip, CapabilityMask::Ignored);
    assert_eq!(store.mpi_aware, CapabilityMask::Unsupported);

    let chunked = engine(EngineKind::Chunked).capabilities().unwrap();
    assert_eq!(chunked.can_chunk, CapabilityMask::Supported);
    assert_eq!(chunked.can_compress_with_gzip, CapabilityMask::Supported);
    assert_eq!(chunked.can_compress_with_szip, CapabilityMask::Unsupported);
    assert_eq!(chunked.mpi_aware, CapabilityMask::Unsupported);
}

#[test]
fn test_obsstore_records_ignored_requests() {
    init_test_tracing();
    let root = engine(EngineKind::ObsStore);
    let params = VariableCreationParams::new()
        .chunk(vec![2])
        .compress_with_szip(16, 4);
    let var = root
        .vars()
        .create_with::<f32>("t", &[4], &[4], params)
        .unwrap();
    assert!(var.is_chunked().unwrap());
    assert_eq!(var.chunk_sizes().unwrap(), vec![2]);
    assert_eq!(var.szip_compression().unwrap(), Some((16, 4)));
    assert_eq!(var.gzip_compression().unwrap(), None);

    let gz = root
        .vars()
        .create_with::<f32>(
            "g",
            &[4],
            &[4],
            VariableCreationParams::new().compress_with_default_gzip(),
        )
        .unwrap();
    assert_eq!(
        gz.gzip_compression().unwrap(),
        Some(EngineConfig::default().default_gzip_level)
    );

    // Resizable variables stay contiguous.
    let grow = root
        .vars()
        .create_with::<f32>("grow", &[4], &[UNLIMITED], VariableCreationParams::new())
        .unwrap();
    assert!(!grow.is_chunked().unwrap());
}

#[test]
fn test_chunked_engine_parameters() {
    let root = engine(EngineKind::Chunked);
    assert_error_kind!(
        root.vars().create_with::<f32>(
            "s",
            &[4],
            &[4],
            VariableCreationParams::new().compress_with_szip(8, 4)
        ),
        ErrorKind::UnsupportedFeature
    );
    assert!(!root.vars().exists("s").unwrap());

    let var = root
        .vars()
        .create_with::<f32>(
            "t",
            &[10],
            &[10],
            VariableCreationParams::new().compress_with_gzip(9),
        )
        .unwrap();
    assert!(var.is_chunked().unwrap());
    assert_eq!(var.chunk_sizes().unwrap(), vec![10]);
    assert_eq!(var.gzip_compression().unwrap(), Some(9));

    assert_error_kind!(
        root.vars().create_with::<f32>(
            "bad",
            &[4, 4],
            &[4, 4],
            VariableCreationParams::new().chunk(vec![2])
        ),
        ErrorKind::InvalidDimensions
    );
    assert_error_kind!(
        root.vars().create_with::<f32>(
            "zero",
            &[4],
            &[4],
            VariableCreationParams::new().chunk(vec![0])
        ),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn test_automatic_chunks_respect_configured_limit() {
    let config = EngineConfig {
        max_chunk_elements: 16,
        ..Default::default()
    };
    let factory = EngineFactory::new(config).unwrap();
    let root = factory.create_root_with(EngineKind::Chunked).unwrap();
    let var = root.vars().create::<i32>("big", &[20, 30]).unwrap();

    let chunks = var.chunk_sizes().unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().product::<u64>() <= 16);

    let values: Vec<i32> = (0..600).collect();
    var.write(&values).unwrap();
    assert_eq!(var.read::<i32>().unwrap(), values);
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn test_obsstore_remove_invalidates_open_handles() {
    let root = engine(EngineKind::ObsStore);
    let var = root.vars().create::<i32>("v", &[2]).unwrap();
    var.atts().unwrap().add::<i32>("n", &[1], &[1]).unwrap();
    let old_id = var.object_id().unwrap();

    root.vars().remove("v").unwrap();
    assert!(!root.vars().exists("v").unwrap());
    assert_error_kind!(var.read::<i32>(), ErrorKind::NotFound);
    assert_error_kind!(var.dimensions(), ErrorKind::NotFound);
    assert_error_kind!(var.atts(), ErrorKind::NotFound);
    assert_error_kind!(root.vars().remove("v"), ErrorKind::NotFound);

    // The name is free again and names a new object.
    let again = root.vars().create::<i32>("v", &[2]).unwrap();
    assert_ne!(again.object_id().unwrap(), old_id);
    assert!(!again.atts().unwrap().exists("n").unwrap());
}

#[test]
fn test_chunked_remove_waits_for_open_handles() {
    let root = engine(EngineKind::Chunked);
    let var = root.vars().create::<i32>("v", &[2]).unwrap();
    let copy = var.clone();

    let err = assert_error_kind!(root.vars().remove("v"), ErrorKind::BackendFailure);
    assert_eq!(err.context().get("name"), Some("v"));
    drop(var);
    assert_error_kind!(root.vars().remove("v"), ErrorKind::BackendFailure);
    drop(copy);

    root.vars().remove("v").unwrap();
    assert!(!root.vars().exists("v").unwrap());
}

// ============================================================================
// Chunk cache
// ============================================================================

#[test]
fn test_compressed_chunks_survive_cache_clear() {
    let factory = factory();
    let root = factory.create_root_with(EngineKind::Chunked).unwrap();
    let params = VariableCreationParams::new()
        .chunk(vec![4])
        .compress_with_default_gzip();
    let var = root
        .vars()
        .create_with::<f32>("t", &[12], &[12], params)
        .unwrap();
    let values = ramp_f32(12, 250.0, 1.25);
    var.write(&values).unwrap();

    let stats = factory.cache_stats();
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.memory_bytes, 48);

    assert_eq!(var.read::<f32>().unwrap(), values);
    assert!(factory.cache_stats().hits >= 3);

    assert_eq!(factory.clear_chunk_cache(), (3, 48));
    assert_eq!(factory.cache_stats().entries, 0);

    let sub = var
        .read_selected::<f32>(&Selection::all(), &Selection::hyperslab(vec![5], vec![2]))
        .unwrap();
    assert_eq!(sub, vec![values[5], values[6]]);
    let stats = factory.cache_stats();
    assert!(stats.misses >= 1);
    assert_eq!(stats.entries, 1);
}

#[test]
fn test_plain_chunks_bypass_the_cache() {
    let factory = factory();
    let root = factory.create_root_with(EngineKind::Chunked).unwrap();
    let var = root.vars().create::<i16>("t", &[8]).unwrap();
    var.write(&[1i16; 8]).unwrap();
    var.read::<i16>().unwrap();
    assert_eq!(factory.cache_stats().entries, 0);
}
