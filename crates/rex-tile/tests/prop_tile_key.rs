use proptest::prelude::*;
use rex_tile::TileKey;

fn arb_key() -> impl Strategy<Value = TileKey> {
    (0u32..=16).prop_flat_map(|lod| {
        let (w, h) = TileKey::tiles_at(lod);
        (Just(lod), 0..w, 0..h).prop_map(|(lod, x, y)| TileKey::new(lod, x, y))
    })
}

proptest! {
    // every child points back at its parent and sits inside the parent's extent
    #[test]
    fn children_round_to_parent(k in arb_key()) {
        let pe = k.extent();
        let children = k.children();
        prop_assert!(children.is_some());
        for c in children.into_iter().flatten() {
            prop_assert!(c.is_valid());
            prop_assert_eq!(c.parent(), Some(k));
            let ce = c.extent();
            prop_assert!(pe.contains(ce.center()));
            prop_assert!((ce.width() * 2.0 - pe.width()).abs() < 1e-9);
        }
    }

    // the key containing a tile's center is the tile itself
    #[test]
    fn containing_center_is_self(k in arb_key()) {
        prop_assert_eq!(TileKey::containing(k.lod, k.extent().center()), Some(k));
    }

    // display output parses back to the same key
    #[test]
    fn string_form_parses_back(k in arb_key()) {
        let parsed: TileKey = k.to_string().parse().unwrap();
        prop_assert_eq!(parsed, k);
    }

    // ancestor_at(lod - 1) agrees with parent()
    #[test]
    fn ancestor_matches_parent(k in arb_key()) {
        if k.lod > 0 {
            prop_assert_eq!(k.ancestor_at(k.lod - 1), k.parent());
        }
        prop_assert_eq!(k.ancestor_at(k.lod), Some(k));
        prop_assert_eq!(k.ancestor_at(k.lod + 1), None);
    }
}
