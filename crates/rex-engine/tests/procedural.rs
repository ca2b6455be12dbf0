use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rex_engine::{EngineConfig, ProceduralEngine};
use rex_map::{Layer, LayerFilter, LayerKind, Map, MapFrame, SourceParams};
use rex_model::{PixelFormat, ResourceKind};
use rex_runtime::{Progress, ProgressToken, TerrainEngine};
use rex_tile::TileKey;

fn map_with(source: SourceParams) -> Arc<Map> {
    Arc::new(Map::new(
        "procedural",
        vec![
            Layer::new(1, "dem", LayerKind::Elevation).with_source(source.clone()),
            Layer::new(2, "imagery", LayerKind::Image).with_source(source),
            Layer::new(3, "detail", LayerKind::Image).with_lod_range(5, 12),
        ],
    ))
}

fn engine() -> ProceduralEngine {
    ProceduralEngine::new(EngineConfig {
        tile_size: 9,
        cache_capacity: 16,
        max_samplers: 2,
    })
}

#[test]
fn builds_elevation_and_covering_imagery() {
    let map = map_with(SourceParams::default());
    let frame = MapFrame::new(&map);
    let key = TileKey::new(2, 3, 1);
    let model = engine()
        .create_tile_model(&frame, &key, &LayerFilter::all(), None)
        .expect("model");

    assert_eq!(model.key(), key);
    assert_eq!(model.revision(), map.data_model_revision());
    let elev = model.elevation.as_ref().expect("elevation");
    assert_eq!(elev.layer, 1);
    assert_eq!((elev.heightfield.width, elev.heightfield.height), (9, 9));
    assert!(elev.min_height <= elev.max_height);
    // layer 3 only starts at lod 5
    assert_eq!(model.color_layers.len(), 1);
    assert_eq!(
        model.color_layers[0].texture.kind(),
        ResourceKind::Texture2D {
            width: 9,
            height: 9,
            format: PixelFormat::Rgba8
        }
    );
}

#[test]
fn neighbours_share_edge_samples() {
    let map = map_with(SourceParams::default());
    let frame = MapFrame::new(&map);
    let engine = engine();
    let west = engine
        .create_tile_model(&frame, &TileKey::new(3, 4, 2), &LayerFilter::all(), None)
        .expect("west");
    let east = engine
        .create_tile_model(&frame, &TileKey::new(3, 5, 2), &LayerFilter::all(), None)
        .expect("east");
    let w = &west.elevation.as_ref().expect("w").heightfield;
    let e = &east.elevation.as_ref().expect("e").heightfield;
    for row in 0..w.height {
        assert_eq!(w.get(w.width - 1, row), e.get(0, row));
    }
}

#[test]
fn filter_limits_layers() {
    let map = map_with(SourceParams::default());
    let frame = MapFrame::new(&map);
    let key = TileKey::new(6, 10, 10);
    let model = engine()
        .create_tile_model(&frame, &key, &LayerFilter::only([3]), None)
        .expect("model");
    assert!(model.elevation.is_none());
    assert_eq!(model.color_layers.len(), 1);
    assert_eq!(model.color_layers[0].layer, 3);

    let bare = engine()
        .create_tile_model(&frame, &TileKey::new(1, 0, 0), &LayerFilter::only([3]), None)
        .expect("empty model");
    assert!(bare.is_empty());
    assert_eq!(bare.revision(), frame.revision());
}

#[test]
fn nth_attempt_asks_for_retry() {
    let map = map_with(SourceParams {
        fail_every: 2,
        ..SourceParams::default()
    });
    let frame = MapFrame::new(&map);
    let engine = engine();
    let filter = LayerFilter::only([2]);

    let first = ProgressToken::new();
    assert!(engine
        .create_tile_model(&frame, &TileKey::new(1, 0, 0), &filter, Some(&first))
        .is_some());
    assert!(!first.needs_retry());

    let second = ProgressToken::new();
    engine.create_tile_model(&frame, &TileKey::new(1, 1, 0), &filter, Some(&second));
    assert!(second.needs_retry());
    assert!(second.message().is_some());
    assert_eq!(engine.stats().retries, 1);
}

#[test]
fn canceled_token_abandons_build() {
    let map = map_with(SourceParams::default());
    let frame = MapFrame::new(&map);
    let engine = engine();
    let token = ProgressToken::new();
    token.cancel();
    let out = engine.create_tile_model(
        &frame,
        &TileKey::new(2, 0, 0),
        &LayerFilter::all(),
        Some(&token),
    );
    assert!(out.is_none());
    assert_eq!(engine.stats().canceled, 1);
    assert_eq!(engine.stats().models, 0);
}

#[test]
fn latency_is_cut_short_by_cancel() {
    let map = map_with(SourceParams {
        latency_ms: 5_000,
        ..SourceParams::default()
    });
    let frame = MapFrame::new(&map);
    let engine = Arc::new(engine());
    let token = ProgressToken::new();

    let worker = {
        let engine = engine.clone();
        let token = token.clone();
        thread::spawn(move || {
            engine.create_tile_model(
                &frame,
                &TileKey::new(0, 0, 0),
                &LayerFilter::all(),
                Some(&token),
            )
        })
    };
    let started = Instant::now();
    thread::sleep(Duration::from_millis(20));
    token.cancel();
    let out = worker.join().expect("worker");
    assert!(out.is_none());
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn cached_heights_follow_revision() {
    let map = map_with(SourceParams::default());
    let engine = engine();
    let key = TileKey::new(2, 1, 1);
    let mut frame = MapFrame::new(&map);

    engine.create_tile_model(&frame, &key, &LayerFilter::all(), None);
    engine.create_tile_model(&frame, &key, &LayerFilter::all(), None);
    assert_eq!(engine.cache().stats().hits, 1);

    map.set_layer_enabled(2, false);
    frame.sync();
    let model = engine
        .create_tile_model(&frame, &key, &LayerFilter::all(), None)
        .expect("model");
    assert_eq!(model.revision(), 2);
    assert!(model.color_layers.is_empty());
    assert_eq!(engine.cache().stats().hits, 1);
    assert_eq!(engine.cache().stats().evictions, 1);
}
