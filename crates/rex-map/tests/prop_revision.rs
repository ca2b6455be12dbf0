use std::sync::Arc;

use proptest::prelude::*;
use rex_map::{Layer, LayerKind, Map, MapFrame};

#[derive(Clone, Debug)]
enum Op {
    Add(u32),
    Remove(u32),
    Toggle(u32, bool),
    Replace,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..6).prop_map(Op::Add),
        (1u32..6).prop_map(Op::Remove),
        (1u32..6, any::<bool>()).prop_map(|(u, e)| Op::Toggle(u, e)),
        Just(Op::Replace),
    ]
}

proptest! {
    // revision never decreases, and a synced frame always matches the map
    #[test]
    fn revision_is_monotonic(ops in proptest::collection::vec(arb_op(), 0..40)) {
        let map = Arc::new(Map::new("p", vec![Layer::new(1, "dem", LayerKind::Elevation)]));
        let mut frame = MapFrame::new(&map);
        let mut last = map.data_model_revision();
        for op in ops {
            match op {
                Op::Add(uid) => { map.add_layer(Layer::new(uid, "l", LayerKind::Image)); }
                Op::Remove(uid) => { map.remove_layer(uid); }
                Op::Toggle(uid, e) => { map.set_layer_enabled(uid, e); }
                Op::Replace => { map.set_layers(vec![Layer::new(1, "dem", LayerKind::Elevation)]); }
            }
            let rev = map.data_model_revision();
            prop_assert!(rev >= last);
            prop_assert_eq!(frame.needs_sync(), rev != frame.revision());
            if frame.needs_sync() {
                prop_assert!(frame.sync());
            }
            prop_assert_eq!(frame.revision(), rev);
            prop_assert_eq!(frame.layers().len(), map.layers().layers.len());
            last = rev;
        }
    }
}
