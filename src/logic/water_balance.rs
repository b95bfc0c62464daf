use crate::config::BalanceConfig;
use crate::models::{AnchorState, ClimateFact, Tree};
use chrono::{DateTime, NaiveTime, Utc};

/// Reference evapotranspiration via a simplified Hargreaves formula (mm).
/// The 15.0 radiation factor is tuned for the grove's latitude; this is a
/// deliberate approximation, not Penman-Monteith.
pub fn hargreaves_et0(max_temp_c: f64, min_temp_c: f64) -> f64 {
    let mean_temp = (max_temp_c + min_temp_c) / 2.0;
    let spread = (max_temp_c - min_temp_c).max(0.0);
    0.0023 * (mean_temp + 17.78) * spread.sqrt() * 15.0
}

/// Effective rainfall: the fraction assumed to infiltrate. Light rain below
/// the threshold evaporates before reaching the root zone and counts as zero.
pub fn effective_rainfall(rain_mm: f64, params: &BalanceConfig) -> f64 {
    if rain_mm >= params.pef_threshold_mm {
        rain_mm * params.pef_fraction
    } else {
        0.0
    }
}

/// One day's balance step: inflow minus evapotranspiration, capped at field
/// capacity. Deficits are not floored; they accumulate below zero.
pub fn step_balance(balance: f64, inflow_mm: f64, etc_mm: f64, capacity_mm: f64) -> f64 {
    (balance + inflow_mm - etc_mm).min(capacity_mm)
}

/// Replay the period's facts as a left-fold over ascending dates, rewriting
/// `pef` and `soil_balance` on each. The balance reseeds at zero every replay
/// so edits to historical facts are picked up on the next run.
///
/// The fold is order-sensitive, so the slice is sorted here rather than
/// trusting the caller's ordering.
pub fn fold_global_balance(facts: &mut [ClimateFact], params: &BalanceConfig) {
    facts.sort_by_key(|f| f.date);

    let mut balance = 0.0;
    for fact in facts.iter_mut() {
        let pef = effective_rainfall(fact.rain, params);
        let etc = fact.et0 * params.reference_kc;
        balance = step_balance(balance, pef, etc, params.field_capacity_mm);

        fact.pef = pef;
        fact.soil_balance = balance;
    }
}

/// Canopy radius approximated from trunk diameter, in three tiers.
/// A missing diameter reads as 0 and lands in the smallest tier.
pub fn canopy_radius_m(trunk_diameter_cm: f64) -> f64 {
    if trunk_diameter_cm > 15.0 {
        1.5
    } else if trunk_diameter_cm >= 5.0 {
        0.75
    } else {
        0.4
    }
}

pub fn canopy_area_m2(trunk_diameter_cm: f64) -> f64 {
    let radius = canopy_radius_m(trunk_diameter_cm);
    std::f64::consts::PI * radius * radius
}

/// The balance fields to persist for one tree after an advance.
#[derive(Debug, Clone)]
pub struct TreeBalanceUpdate {
    pub tree_id: String,
    pub soil_balance: f64,
    pub start_of_day_balance: f64,
    pub last_balance_update: DateTime<Utc>,
    pub calculated_reg_area: f64,
}

/// Advance one tree's balance against the latest available climate fact.
///
/// The anchor rule makes same-day re-runs idempotent: a tree already
/// advanced for `latest.date` recomputes from its stored start-of-day
/// balance, while a new day rolls the previous end-of-day balance forward
/// as the fresh anchor.
pub fn advance_tree(
    tree: &Tree,
    latest: &ClimateFact,
    liters: f64,
    params: &BalanceConfig,
) -> TreeBalanceUpdate {
    let area = canopy_area_m2(tree.trunk_diameter_cm.unwrap_or(0.0));

    // Liters per m² are mm of water depth
    let irrig_mm = liters / area;

    let kc = tree.kc.unwrap_or(params.default_tree_kc);
    let etc = latest.et0 * kc;

    let anchor = match tree.anchor_state(latest.date) {
        AnchorState::AnchoredToday => tree
            .start_of_day_balance
            .or(tree.soil_balance)
            .unwrap_or(0.0),
        AnchorState::NeedsNewAnchor => tree.soil_balance.unwrap_or(0.0),
    };

    let new_balance = step_balance(anchor, latest.pef + irrig_mm, etc, params.field_capacity_mm);

    TreeBalanceUpdate {
        tree_id: tree.id.clone(),
        soil_balance: new_balance,
        start_of_day_balance: anchor,
        // Day-start marker, not the wall-clock time of this run
        last_balance_update: latest.date.and_time(NaiveTime::MIN).and_utc(),
        calculated_reg_area: area,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TreeStatus;
    use chrono::NaiveDate;

    fn params() -> BalanceConfig {
        BalanceConfig::default()
    }

    fn fact(date: NaiveDate, rain: f64, et0: f64) -> ClimateFact {
        ClimateFact {
            farm_id: "test-farm".into(),
            date,
            max_temp: 25.0,
            min_temp: 12.0,
            rain,
            rain_accumulated: rain,
            humidity: 55.0,
            radiation: 15.0,
            wind_speed: 2.0,
            et0,
            pef: 0.0,
            soil_balance: 0.0,
            is_mock: false,
            last_updated: Utc::now(),
        }
    }

    fn tree(id: &str) -> Tree {
        Tree {
            id: id.into(),
            status: TreeStatus::Viable,
            trunk_diameter_cm: Some(10.0),
            kc: None,
            soil_balance: None,
            start_of_day_balance: None,
            last_balance_update: None,
            calculated_reg_area: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[test]
    fn et0_matches_formula_for_fixed_inputs() {
        // maxTemp=30, minTemp=10 -> meanTemp=20, spread=20
        let expected = 0.0023 * (20.0 + 17.78) * 20.0_f64.sqrt() * 15.0;
        assert!((hargreaves_et0(30.0, 10.0) - expected).abs() < 1e-12);
        assert!((hargreaves_et0(30.0, 10.0) - 5.82903).abs() < 1e-4);
    }

    #[test]
    fn et0_is_zero_when_spread_is_zero_or_inverted() {
        assert!((hargreaves_et0(15.0, 15.0)).abs() < f64::EPSILON);
        // Sensor glitch: min above max must not produce NaN
        assert!((hargreaves_et0(10.0, 15.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn effective_rainfall_threshold() {
        assert!((effective_rainfall(3.9, &params()) - 0.0).abs() < f64::EPSILON);
        assert!((effective_rainfall(4.0, &params()) - 3.0).abs() < f64::EPSILON);
        assert!((effective_rainfall(10.0, &params()) - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn balance_caps_at_field_capacity() {
        assert!((step_balance(30.0, 100.0, 0.0, 35.0) - 35.0).abs() < f64::EPSILON);
        // No floor: deficits accumulate below zero
        assert!((step_balance(-10.0, 0.0, 5.0, 35.0) - (-15.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn fold_replays_month_from_zero() {
        let mut facts = vec![
            fact(day(1), 10.0, 2.0), // pef 7.5, etc 1.2 -> 6.3
            fact(day(2), 0.0, 3.0),  // etc 1.8 -> 4.5
            fact(day(3), 3.9, 1.0),  // below threshold, etc 0.6 -> 3.9
        ];
        fold_global_balance(&mut facts, &params());
        assert!((facts[0].soil_balance - 6.3).abs() < 1e-9);
        assert!((facts[1].soil_balance - 4.5).abs() < 1e-9);
        assert!((facts[2].soil_balance - 3.9).abs() < 1e-9);
        assert!((facts[2].pef - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fold_sorts_facts_before_replaying() {
        let mut shuffled = vec![
            fact(day(3), 3.9, 1.0),
            fact(day(1), 10.0, 2.0),
            fact(day(2), 0.0, 3.0),
        ];
        fold_global_balance(&mut shuffled, &params());
        assert_eq!(shuffled[0].date, day(1));
        assert_eq!(shuffled[2].date, day(3));
        // Same result as feeding the facts in ascending order
        assert!((shuffled[2].soil_balance - 3.9).abs() < 1e-9);
    }

    #[test]
    fn fold_never_exceeds_capacity() {
        let mut facts: Vec<ClimateFact> = (1..=20).map(|d| fact(day(d), 50.0, 0.1)).collect();
        fold_global_balance(&mut facts, &params());
        for f in &facts {
            assert!(f.soil_balance <= 35.0);
        }
    }

    #[test]
    fn canopy_area_tiers() {
        use std::f64::consts::PI;
        assert!((canopy_area_m2(4.9) - PI * 0.4 * 0.4).abs() < 1e-9);
        assert!((canopy_area_m2(5.0) - PI * 0.75 * 0.75).abs() < 1e-9);
        assert!((canopy_area_m2(15.0) - PI * 0.75 * 0.75).abs() < 1e-9);
        assert!((canopy_area_m2(15.1) - PI * 1.5 * 1.5).abs() < 1e-9);
        // Missing diameter defaults to 0 -> smallest tier
        assert!((canopy_area_m2(0.0) - PI * 0.4 * 0.4).abs() < 1e-9);
    }

    #[test]
    fn advance_applies_irrigation_as_depth() {
        let mut t = tree("t1");
        t.soil_balance = Some(2.0);
        let latest = fact(day(10), 0.0, 2.0); // etc = 1.2 with default kc
        let area = canopy_area_m2(10.0);
        let liters = area * 3.0; // exactly 3mm of depth

        let update = advance_tree(&t, &latest, liters, &params());
        assert!((update.soil_balance - (2.0 + 3.0 - 1.2)).abs() < 1e-9);
        assert!((update.start_of_day_balance - 2.0).abs() < f64::EPSILON);
        assert!((update.calculated_reg_area - area).abs() < 1e-9);
        assert_eq!(update.last_balance_update.date_naive(), day(10));
    }

    #[test]
    fn same_day_rerun_is_idempotent() {
        let latest = fact(day(10), 5.0, 2.0);
        let mut t = tree("t1");
        t.soil_balance = Some(1.0);

        let first = advance_tree(&t, &latest, 10.0, &params());

        // Persist the first advance, then re-run for the same day
        t.soil_balance = Some(first.soil_balance);
        t.start_of_day_balance = Some(first.start_of_day_balance);
        t.last_balance_update = Some(first.last_balance_update);

        let second = advance_tree(&t, &latest, 10.0, &params());
        assert!((second.soil_balance - first.soil_balance).abs() < 1e-12);
        assert!((second.start_of_day_balance - first.start_of_day_balance).abs() < 1e-12);
    }

    #[test]
    fn new_day_rolls_anchor_forward() {
        let mut t = tree("t1");
        t.soil_balance = Some(7.0);
        t.start_of_day_balance = Some(3.0);
        t.last_balance_update = Some(day(10).and_time(chrono::NaiveTime::MIN).and_utc());

        let next_day = fact(day(11), 0.0, 1.0);
        let update = advance_tree(&t, &next_day, 0.0, &params());

        // Yesterday's end-of-day balance becomes the new anchor
        assert!((update.start_of_day_balance - 7.0).abs() < f64::EPSILON);
        assert_eq!(update.last_balance_update.date_naive(), day(11));
    }

    #[test]
    fn tree_balance_caps_at_capacity() {
        let mut t = tree("t1");
        t.soil_balance = Some(30.0);
        // pef alone would push past 35 even before irrigation
        let mut latest = fact(day(10), 40.0, 0.0);
        latest.pef = 30.0;
        let update = advance_tree(&t, &latest, 500.0, &params());
        assert!((update.soil_balance - 35.0).abs() < f64::EPSILON);
    }

    #[test]
    fn kc_override_changes_etc() {
        let mut t = tree("t1");
        t.kc = Some(1.0);
        t.soil_balance = Some(10.0);
        let latest = fact(day(10), 0.0, 3.0);

        let update = advance_tree(&t, &latest, 0.0, &params());
        assert!((update.soil_balance - (10.0 - 3.0)).abs() < 1e-9);
    }

    #[test]
    fn unset_balances_default_to_zero() {
        let t = tree("fresh");
        let latest = fact(day(10), 0.0, 2.0);
        let update = advance_tree(&t, &latest, 0.0, &params());
        assert!((update.start_of_day_balance - 0.0).abs() < f64::EPSILON);
        assert!((update.soil_balance - (-1.2)).abs() < 1e-9);
    }
}
