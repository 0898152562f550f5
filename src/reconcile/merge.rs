use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{ConversionRecord, DateRange, MergedMetric, SpendRecord};

/// Cost per conversion at 2 dp, ties to even. `None` when there are no conversions.
pub fn compute_cpa(spend: Decimal, conversions: u32) -> Option<Decimal> {
    if conversions == 0 {
        return None;
    }
    let cpa = spend / Decimal::from(conversions);
    Some(cpa.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven))
}

/// Full outer join of the two feeds on (date, campaign_id).
///
/// A side missing for a key contributes zero. Within one feed a repeated key keeps its
/// last value. Output is sorted by (date, campaign_id) whatever the input order.
pub fn merge(spend: &[SpendRecord], conversions: &[ConversionRecord]) -> Vec<MergedMetric> {
    let mut joined: BTreeMap<(NaiveDate, String), (Decimal, u32)> = BTreeMap::new();

    for r in spend {
        joined
            .entry((r.date, r.campaign_id.clone()))
            .or_insert((Decimal::ZERO, 0))
            .0 = r.spend;
    }
    for r in conversions {
        joined
            .entry((r.date, r.campaign_id.clone()))
            .or_insert((Decimal::ZERO, 0))
            .1 = r.conversions;
    }

    joined
        .into_iter()
        .map(|((date, campaign_id), (spend, conversions))| MergedMetric {
            date,
            campaign_id,
            spend,
            conversions,
            cpa: compute_cpa(spend, conversions),
        })
        .collect()
}

/// Keeps records whose date falls inside `range`. Order is preserved.
pub fn filter_by_range(records: Vec<MergedMetric>, range: DateRange) -> Vec<MergedMetric> {
    if range.is_unbounded() {
        return records;
    }
    records.into_iter().filter(|r| range.contains(r.date)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn spend(date: &str, cid: &str, amount: Decimal) -> SpendRecord {
        SpendRecord {
            date: d(date),
            campaign_id: cid.to_string(),
            spend: amount,
        }
    }

    fn conv(date: &str, cid: &str, n: u32) -> ConversionRecord {
        ConversionRecord {
            date: d(date),
            campaign_id: cid.to_string(),
            conversions: n,
        }
    }

    #[test]
    fn cpa_rounds_to_cents() {
        assert_eq!(compute_cpa(dec!(37.50), 14), Some(dec!(2.68)));
        assert_eq!(compute_cpa(dec!(19.90), 3), Some(dec!(6.63)));
        assert_eq!(compute_cpa(dec!(100.00), 10), Some(dec!(10.00)));
    }

    #[test]
    fn cpa_ties_go_to_even() {
        // 0.125 and 0.135 are exact midpoints
        assert_eq!(compute_cpa(dec!(0.25), 2), Some(dec!(0.12)));
        assert_eq!(compute_cpa(dec!(0.27), 2), Some(dec!(0.14)));
    }

    #[test]
    fn cpa_absent_without_conversions() {
        assert_eq!(compute_cpa(dec!(50.00), 0), None);
        assert_eq!(compute_cpa(Decimal::ZERO, 0), None);
    }

    #[test]
    fn merge_joins_on_date_and_campaign() {
        let out = merge(
            &[spend("2025-06-04", "C1", dec!(37.50))],
            &[conv("2025-06-04", "C1", 14)],
        );
        assert_eq!(
            out,
            vec![MergedMetric {
                date: d("2025-06-04"),
                campaign_id: "C1".to_string(),
                spend: dec!(37.50),
                conversions: 14,
                cpa: Some(dec!(2.68)),
            }]
        );
    }

    #[test]
    fn missing_spend_side_defaults_to_zero() {
        let out = merge(&[], &[conv("2025-06-04", "C1", 10)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].spend, Decimal::ZERO);
        assert_eq!(out[0].conversions, 10);
        assert_eq!(out[0].cpa, Some(dec!(0.00)));
    }

    #[test]
    fn missing_conversions_side_leaves_cpa_empty() {
        let out = merge(&[spend("2025-06-05", "C9", dec!(11.00))], &[]);
        assert_eq!(out[0].conversions, 0);
        assert_eq!(out[0].cpa, None);
    }

    #[test]
    fn repeated_key_keeps_last_value() {
        let out = merge(
            &[
                spend("2025-06-04", "C1", dec!(1.00)),
                spend("2025-06-04", "C1", dec!(2.00)),
            ],
            &[],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].spend, dec!(2.00));
    }

    #[test]
    fn output_sorted_by_date_then_campaign() {
        let out = merge(
            &[
                spend("2025-06-05", "A", dec!(1)),
                spend("2025-06-04", "B", dec!(1)),
            ],
            &[conv("2025-06-04", "A", 1)],
        );
        let keys: Vec<_> = out.iter().map(|m| (m.date.to_string(), m.campaign_id.clone())).collect();
        assert_eq!(
            keys,
            vec![
                ("2025-06-04".to_string(), "A".to_string()),
                ("2025-06-04".to_string(), "B".to_string()),
                ("2025-06-05".to_string(), "A".to_string()),
            ]
        );
    }

    #[test]
    fn filter_is_inclusive_and_preserves_order() {
        let merged = merge(
            &[
                spend("2025-06-03", "A", dec!(1)),
                spend("2025-06-04", "A", dec!(1)),
                spend("2025-06-05", "A", dec!(1)),
                spend("2025-06-06", "A", dec!(1)),
            ],
            &[],
        );
        let range = DateRange::new(Some(d("2025-06-04")), Some(d("2025-06-05"))).unwrap();
        let out = filter_by_range(merged.clone(), range);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, d("2025-06-04"));
        assert_eq!(out[1].date, d("2025-06-05"));

        let from = DateRange::new(Some(d("2025-06-05")), None).unwrap();
        assert_eq!(filter_by_range(merged.clone(), from).len(), 2);

        assert_eq!(filter_by_range(merged.clone(), DateRange::default()), merged);
    }

    // ---------------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------------

    fn key_strategy() -> impl Strategy<Value = (u32, String)> {
        (0u32..10, "[A-D][0-3]")
    }

    fn date_for(offset: u32) -> NaiveDate {
        d("2025-06-01") + chrono::Duration::days(i64::from(offset))
    }

    prop_compose! {
        fn feeds()(
            spend_keys in prop::collection::btree_set(key_strategy(), 0..20),
            conv_keys in prop::collection::btree_set(key_strategy(), 0..20),
            cents in prop::collection::vec(0i64..1_000_000, 20),
            counts in prop::collection::vec(0u32..50, 20),
        ) -> (Vec<SpendRecord>, Vec<ConversionRecord>) {
            let spend = spend_keys
                .into_iter()
                .zip(cents)
                .map(|((off, cid), c)| SpendRecord {
                    date: date_for(off),
                    campaign_id: cid,
                    spend: Decimal::new(c, 2),
                })
                .collect();
            let conversions = conv_keys
                .into_iter()
                .zip(counts)
                .map(|((off, cid), n)| ConversionRecord {
                    date: date_for(off),
                    campaign_id: cid,
                    conversions: n,
                })
                .collect();
            (spend, conversions)
        }
    }

    proptest! {
        #[test]
        fn output_size_is_union_of_keys((spend, conversions) in feeds()) {
            let keys: BTreeSet<(NaiveDate, String)> = spend
                .iter()
                .map(|r| (r.date, r.campaign_id.clone()))
                .chain(conversions.iter().map(|r| (r.date, r.campaign_id.clone())))
                .collect();
            prop_assert_eq!(merge(&spend, &conversions).len(), keys.len());
        }

        #[test]
        fn cpa_absent_iff_zero_conversions((spend, conversions) in feeds()) {
            for m in merge(&spend, &conversions) {
                prop_assert_eq!(m.cpa.is_none(), m.conversions == 0);
            }
        }

        #[test]
        fn shuffled_input_gives_same_sorted_output(
            ((spend, conversions), shuffled) in feeds().prop_flat_map(|(s, c)| {
                let shuffled = (Just(s.clone()).prop_shuffle(), Just(c.clone()).prop_shuffle());
                (Just((s, c)), shuffled)
            })
        ) {
            let expected = merge(&spend, &conversions);
            let actual = merge(&shuffled.0, &shuffled.1);
            prop_assert!(actual.windows(2).all(|w| w[0].key() < w[1].key()));
            prop_assert_eq!(actual, expected);
        }
    }
}
