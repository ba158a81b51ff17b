use docent_core::evidence::{prioritize, EvidenceItem, PrioritizeOptions};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

const CATEGORIES: [&str; 3] = ["policy", "ops", "hr"];
const PLANNED: [&str; 2] = ["policy", "ops"];

fn build(specs: &[(usize, Option<f64>)]) -> Vec<EvidenceItem> {
    specs
        .iter()
        .enumerate()
        .map(|(i, (cat, distance))| {
            let mut m = serde_json::Map::new();
            m.insert("id".into(), json!(format!("doc-{:03}", i)));
            m.insert("document_type".into(), json!(CATEGORIES[*cat]));
            if let Some(d) = distance {
                m.insert("distance".into(), json!(d));
            }
            EvidenceItem::new(format!("chunk {}", i), m)
        })
        .collect()
}

fn items_strategy() -> impl Strategy<Value = Vec<(usize, Option<f64>)>> {
    prop::collection::vec((0usize..3, prop::option::of(0.0f64..2.0)), 0..30)
}

fn ids(items: &[EvidenceItem]) -> Vec<String> {
    items.iter().map(|i| i.id().unwrap_or("").to_string()).collect()
}

proptest! {
    #[test]
    fn output_is_capped(specs in items_strategy()) {
        let options = PrioritizeOptions::default();
        let n = specs.len();
        let out = prioritize(build(&specs), &PLANNED, options);
        prop_assert_eq!(out.len(), n.min(options.max_total));
    }

    #[test]
    fn every_bucket_gets_its_minimum(specs in items_strategy()) {
        let options = PrioritizeOptions::default();
        let items = build(&specs);

        let mut available: HashMap<String, usize> = HashMap::new();
        for item in &items {
            *available.entry(item.bucket_key().to_string()).or_default() += 1;
        }

        let out = prioritize(items, &PLANNED, options);
        let mut taken: HashMap<String, usize> = HashMap::new();
        for item in &out {
            *taken.entry(item.bucket_key().to_string()).or_default() += 1;
        }

        // Three buckets of three never exceed the total cap of ten
        for (bucket, count) in available {
            let got = taken.get(&bucket).copied().unwrap_or(0);
            prop_assert!(
                got >= count.min(options.min_per_bucket),
                "bucket {} got {} of {}", bucket, got, count
            );
        }
    }

    #[test]
    fn buckets_keep_distance_order(specs in items_strategy()) {
        let out = prioritize(build(&specs), &PLANNED, PrioritizeOptions::default());
        for category in CATEGORIES {
            let distances: Vec<f64> = out
                .iter()
                .filter(|i| i.category() == Some(category))
                .map(|i| i.distance())
                .collect();
            prop_assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn arrival_order_does_not_matter(specs in items_strategy()) {
        let options = PrioritizeOptions::default();
        let forward = prioritize(build(&specs), &PLANNED, options);

        let mut reversed = build(&specs);
        reversed.reverse();
        let backward = prioritize(reversed, &PLANNED, options);

        prop_assert_eq!(ids(&forward), ids(&backward));
    }

    #[test]
    fn single_tool_only_sorts(specs in items_strategy()) {
        let n = specs.len();
        let out = prioritize(build(&specs), &["policy"], PrioritizeOptions::default());
        prop_assert_eq!(out.len(), n);
        let distances: Vec<f64> = out.iter().map(|i| i.distance()).collect();
        prop_assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }
}
