//! Property-based tests for depth resolution, provenance and merging.

use std::collections::BTreeMap;

use icecore::{
    merge, Core, CoreInfo, DepthColumns, DepthModel, DepthResolver, Profile, PropertyColumnSet,
    VerticalReference,
};
use proptest::prelude::*;

const EPS: f64 = 1e-9;

/// Increasing section bounds starting at the surface.
fn arb_bounds() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.01f64..0.2, 1..12).prop_map(|steps| {
        let mut bounds = vec![0.0];
        for step in steps {
            let last = *bounds.last().unwrap_or(&0.0);
            bounds.push(last + step);
        }
        bounds
    })
}

fn split(bounds: &[f64]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let low = bounds[..bounds.len() - 1].to_vec();
    let sup = bounds[1..].to_vec();
    let mid = low.iter().zip(&sup).map(|(l, s)| (l + s) / 2.0).collect();
    (low, mid, sup)
}

fn close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < EPS)
}

/// Up to three properties, each value present or missing per row.
fn arb_profile(name: &'static str) -> impl Strategy<Value = Profile> {
    (1usize..10).prop_flat_map(move |rows| {
        prop::collection::vec(prop::collection::vec(prop::option::of(-10.0f64..40.0), rows), 1..4)
            .prop_map(move |columns| {
                let low: Vec<f64> = (0..rows).map(|i| i as f64 * 0.1).collect();
                let sup: Vec<f64> = (0..rows).map(|i| (i + 1) as f64 * 0.1).collect();
                let mid = low.iter().zip(&sup).map(|(l, s)| (l + s) / 2.0).collect();
                let properties: BTreeMap<String, PropertyColumnSet> = columns
                    .into_iter()
                    .enumerate()
                    .map(|(k, values)| {
                        (
                            ["density", "salinity", "temperature"][k].to_string(),
                            PropertyColumnSet {
                                value: Some(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()),
                                ..Default::default()
                            },
                        )
                    })
                    .collect();
                Profile::from_parts(
                    Some(name.to_string()),
                    VerticalReference::default(),
                    DepthModel {
                        y_low: low,
                        y_mid: mid,
                        y_sup: sup,
                    },
                    vec![],
                    properties,
                    BTreeMap::new(),
                )
            })
    })
}

proptest! {
    #[test]
    fn bounds_give_mid_points(bounds in arb_bounds()) {
        let (low, mid, sup) = split(&bounds);
        let model = DepthResolver::default()
            .resolve(DepthColumns { y_low: Some(low), y_mid: None, y_sup: Some(sup) })
            .unwrap();
        prop_assert!(close(&model.y_mid, &mid));
    }

    #[test]
    fn low_and_mid_give_upper_bounds(bounds in arb_bounds()) {
        let (low, mid, sup) = split(&bounds);
        let model = DepthResolver::default()
            .resolve(DepthColumns { y_low: Some(low), y_mid: Some(mid), y_sup: None })
            .unwrap();
        prop_assert!(close(&model.y_sup, &sup));
    }

    #[test]
    fn mid_and_sup_give_lower_bounds(bounds in arb_bounds()) {
        let (low, mid, sup) = split(&bounds);
        let model = DepthResolver::default()
            .resolve(DepthColumns { y_low: None, y_mid: Some(mid), y_sup: Some(sup) })
            .unwrap();
        prop_assert!(close(&model.y_low, &low));
    }

    #[test]
    fn consistent_triples_pass_through(bounds in arb_bounds()) {
        let (low, mid, sup) = split(&bounds);
        let model = DepthResolver::default()
            .resolve(DepthColumns {
                y_low: Some(low.clone()),
                y_mid: Some(mid.clone()),
                y_sup: Some(sup.clone()),
            })
            .unwrap();
        prop_assert!(close(&model.y_low, &low));
        prop_assert!(close(&model.y_mid, &mid));
        prop_assert!(close(&model.y_sup, &sup));
    }

    #[test]
    fn trailing_blank_rows_are_discarded(bounds in arb_bounds(), padding in 0usize..5) {
        let (mut low, _, mut sup) = split(&bounds);
        let rows = low.len();
        low.extend(std::iter::repeat(f64::NAN).take(padding));
        sup.extend(std::iter::repeat(f64::NAN).take(padding));
        let model = DepthResolver::default()
            .resolve(DepthColumns { y_low: Some(low), y_mid: None, y_sup: Some(sup) })
            .unwrap();
        prop_assert_eq!(model.len(), rows);
    }

    #[test]
    fn provenance_matches_present_values(profile in arb_profile("X1")) {
        for row in 0..profile.len() {
            let present: Vec<&str> = profile
                .property_names()
                .filter(|p| profile.value(p, row).is_some())
                .collect();
            prop_assert_eq!(profile.property_label(row), present.join(", "));
        }
    }

    #[test]
    fn merge_with_itself_is_identity(profile in arb_profile("X1")) {
        let twice = merge(&profile, &profile).unwrap();
        prop_assert_eq!(twice.len(), profile.len());
        prop_assert_eq!(twice.property_labels(), profile.property_labels());
        for name in profile.property_names() {
            for row in 0..profile.len() {
                prop_assert_eq!(twice.value(name, row), profile.value(name, row));
            }
        }
    }

    #[test]
    fn merge_keeps_every_row_of_both_sides(a in arb_profile("X1"), b in arb_profile("X1")) {
        let merged = merge(&a, &b).unwrap();
        prop_assert_eq!(merged.len(), a.len().max(b.len()));
        for row in 0..merged.len() {
            prop_assert_eq!(
                merged.property_label(row),
                merged.present_properties(row).into_iter().collect::<Vec<_>>().join(", ")
            );
        }
    }

    #[test]
    fn collection_is_sorted_unique_and_holds_own_name(
        names in prop::collection::vec("[A-Z][0-9]{1,2}", 0..10)
    ) {
        let mut core = Core::new("X1", CoreInfo::default());
        core.add_to_collection(&names);
        core.add_to_collection(&names);
        let collection = core.collection();
        prop_assert!(collection.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(collection.iter().filter(|c| c.as_str() == "X1").count(), 1);
        for name in &names {
            prop_assert!(collection.contains(name));
        }
    }

    #[test]
    fn repeated_comments_are_stored_once(text in "[a-z]{1,8}( [a-z]{1,8})?", times in 1usize..5) {
        let mut core = Core::new("X1", CoreInfo::default());
        for _ in 0..times {
            core.add_comment(Some(text.as_str()));
        }
        prop_assert_eq!(core.comment(), Some(text.as_str()));
    }
}
