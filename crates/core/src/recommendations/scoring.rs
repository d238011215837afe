//! Scoring formulas shared by the recommendation strategies
//!
//! Everything here is pure: no I/O, no clock. Callers pass `now` explicitly.

use chrono::{DateTime, Duration, Utc};

use crate::domain::listing::{AttributeSet, AttributeValue, CatalogItem, Location};

use super::types::{EngagementSummary, PriceAffinity};

pub const PRICE_POINTS: f64 = 30.0;
pub const SAME_CATEGORY_POINTS: f64 = 20.0;
pub const SIBLING_CATEGORY_POINTS: f64 = 10.0;
pub const SAME_CITY_POINTS: f64 = 20.0;
pub const SAME_LOCATION_POINTS: f64 = 10.0;
pub const ENGAGEMENT_POINTS: f64 = 15.0;
pub const ENGAGEMENT_VIEW_CAP: f64 = 100.0;

/// (max age in days, points), checked in order with an exclusive bound.
pub const FRESHNESS_STEPS: [(i64, f64); 3] = [(7, 15.0), (30, 10.0), (90, 5.0)];

/// Relative difference under which two numeric attribute values count as a match.
pub const ATTRIBUTE_NUMERIC_TOLERANCE: f64 = 0.1;

pub const AFFINITY_NEAR_BUCKET: f64 = 30.0;
pub const AFFINITY_WIDE_BUCKET: f64 = 20.0;
pub const AFFINITY_OUTSIDE_BUCKET: f64 = 10.0;
pub const AFFINITY_NO_HISTORY: f64 = 20.0;

/// Engagement weights for the trend score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendWeights {
    pub total_views: f64,
    pub unique_viewers: f64,
    pub favorites: f64,
    pub phone_clicks: f64,
    pub avg_view_duration: f64,
}

pub const TREND_WEIGHTS: TrendWeights = TrendWeights {
    total_views: 0.20,
    unique_viewers: 0.30,
    favorites: 0.25,
    phone_clicks: 0.15,
    avg_view_duration: 0.10,
};

impl Default for TrendWeights {
    fn default() -> Self {
        TREND_WEIGHTS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryRelation {
    Same,
    Sibling,
    Unrelated,
}

impl CategoryRelation {
    pub fn points(&self) -> f64 {
        match self {
            Self::Same => SAME_CATEGORY_POINTS,
            Self::Sibling => SIBLING_CATEGORY_POINTS,
            Self::Unrelated => 0.0,
        }
    }
}

/// Per-signal breakdown of the 0-100 content similarity score.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContentScore {
    pub price: f64,
    pub category: f64,
    pub location: f64,
    pub engagement: f64,
    pub freshness: f64,
}

impl ContentScore {
    pub fn total(&self) -> f64 {
        self.price + self.category + self.location + self.engagement + self.freshness
    }
}

pub fn content_score(
    reference: &CatalogItem,
    candidate: &CatalogItem,
    relation: CategoryRelation,
    now: DateTime<Utc>,
) -> ContentScore {
    ContentScore {
        price: price_similarity(candidate.price_f64(), reference.price_f64()),
        category: relation.points(),
        location: location_score(&candidate.location, &reference.location),
        engagement: engagement_score(candidate.views_count),
        freshness: freshness_score(candidate.created_at, now),
    }
}

/// `(1 - min(|p - r| / max(p, r), 1)) * 30`, zero when either price is zero.
pub fn price_similarity(price: f64, reference: f64) -> f64 {
    if price <= 0.0 || reference <= 0.0 {
        return 0.0;
    }
    let relative = ((price - reference).abs() / price.max(reference)).min(1.0);
    (1.0 - relative) * PRICE_POINTS
}

pub fn location_score(candidate: &Location, reference: &Location) -> f64 {
    if both_present_and_equal(candidate.city.as_deref(), reference.city.as_deref()) {
        SAME_CITY_POINTS
    } else if both_present_and_equal(candidate.raw.as_deref(), reference.raw.as_deref()) {
        SAME_LOCATION_POINTS
    } else {
        0.0
    }
}

fn both_present_and_equal(left: Option<&str>, right: Option<&str>) -> bool {
    matches!((left, right), (Some(a), Some(b)) if !a.is_empty() && a == b)
}

pub fn engagement_score(views: u32) -> f64 {
    (f64::from(views) / ENGAGEMENT_VIEW_CAP).min(1.0) * ENGAGEMENT_POINTS
}

pub fn freshness_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    FRESHNESS_STEPS
        .iter()
        .find(|(days, _)| created_at > now - Duration::days(*days))
        .map_or(0.0, |(_, points)| *points)
}

/// Jaccard-style overlap: `matches / (|A| + |B| - matches)`, zero when either side is empty.
pub fn attribute_similarity(left: &AttributeSet, right: &AttributeSet) -> f64 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let matches = left
        .iter()
        .filter(|(name, value)| right.get(*name).is_some_and(|other| values_similar(value, other)))
        .count();

    let union = left.len() + right.len() - matches;
    if union == 0 {
        0.0
    } else {
        matches as f64 / union as f64
    }
}

fn values_similar(left: &AttributeValue, right: &AttributeValue) -> bool {
    if left == right {
        return true;
    }

    match (numeric_value(left), numeric_value(right)) {
        (Some(a), Some(b)) => {
            let average = (a + b) / 2.0;
            average > 0.0 && (a - b).abs() / average < ATTRIBUTE_NUMERIC_TOLERANCE
        }
        _ => false,
    }
}

/// Numbers, and text such as `"1,200 km"` that reads as a number with a unit suffix.
fn numeric_value(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Number(number) => Some(*number),
        AttributeValue::Text(text) => {
            let compact: String =
                text.chars().filter(|ch| *ch != ',' && !ch.is_whitespace()).collect();
            let digits = compact.trim_end_matches(|ch: char| ch.is_alphabetic());
            if digits.is_empty() {
                return None;
            }
            digits.parse::<f64>().ok().filter(|number| number.is_finite())
        }
        AttributeValue::Boolean(_) => None,
    }
}

/// Price profile over the actor's event rows; `None` when no positive price was seen.
pub fn price_affinity(prices: impl IntoIterator<Item = f64>) -> Option<PriceAffinity> {
    let mut samples = 0usize;
    let mut total = 0.0;
    let mut min = f64::MAX;
    let mut max = f64::MIN;

    for price in prices.into_iter().filter(|price| *price > 0.0) {
        samples += 1;
        total += price;
        min = min.min(price);
        max = max.max(price);
    }

    (samples > 0).then(|| PriceAffinity { average: total / samples as f64, min, max, samples })
}

/// 30 inside `[0.8a, 1.2a]`, 20 inside `[0.5a, 1.5a]`, else 10. Flat 20 without history.
pub fn price_bucket(price: f64, affinity: Option<&PriceAffinity>) -> f64 {
    let Some(affinity) = affinity else {
        return AFFINITY_NO_HISTORY;
    };
    let average = affinity.average;

    if (average * 0.8..=average * 1.2).contains(&price) {
        AFFINITY_NEAR_BUCKET
    } else if (average * 0.5..=average * 1.5).contains(&price) {
        AFFINITY_WIDE_BUCKET
    } else {
        AFFINITY_OUTSIDE_BUCKET
    }
}

pub fn trend_score(summary: &EngagementSummary, weights: &TrendWeights) -> f64 {
    summary.total_views as f64 * weights.total_views
        + summary.unique_viewers as f64 * weights.unique_viewers
        + summary.favorites as f64 * weights.favorites
        + summary.phone_clicks as f64 * weights.phone_clicks
        + summary.avg_view_duration * weights.avg_view_duration
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::domain::listing::{AttributeSet, AttributeValue, Location};

    fn attrs(pairs: &[(&str, AttributeValue)]) -> AttributeSet {
        pairs.iter().map(|(name, value)| (name.to_string(), value.clone())).collect()
    }

    #[test]
    fn price_similarity_matches_reference_example() {
        let score = price_similarity(900.0, 1000.0);
        assert!((score - 27.0).abs() < 1e-9, "got {score}");
        assert!((price_similarity(1000.0, 1000.0) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn price_similarity_is_zero_for_free_items() {
        assert_eq!(price_similarity(0.0, 1000.0), 0.0);
        assert_eq!(price_similarity(500.0, 0.0), 0.0);
    }

    #[test]
    fn price_similarity_is_monotone_in_distance() {
        let reference = 1000.0;
        let mut previous = f64::MAX;
        for price in [1000.0, 1100.0, 1300.0, 1800.0, 3000.0, 10_000.0] {
            let score = price_similarity(price, reference);
            assert!(score <= previous, "{price} scored {score} above {previous}");
            previous = score;
        }
        let mut previous = f64::MAX;
        for price in [1000.0, 900.0, 700.0, 400.0, 100.0] {
            let score = price_similarity(price, reference);
            assert!(score <= previous);
            previous = score;
        }
    }

    #[test]
    fn location_prefers_city_over_raw_string() {
        let reference = Location {
            raw: Some("Novi Sad, Serbia".to_string()),
            city: Some("Novi Sad".to_string()),
            ..Location::default()
        };
        let same_city = Location { city: Some("Novi Sad".to_string()), ..Location::default() };
        let same_raw = Location { raw: Some("Novi Sad, Serbia".to_string()), ..Location::default() };
        let unknown = Location::default();

        assert_eq!(location_score(&same_city, &reference), SAME_CITY_POINTS);
        assert_eq!(location_score(&same_raw, &reference), SAME_LOCATION_POINTS);
        assert_eq!(location_score(&unknown, &reference), 0.0);
        assert_eq!(location_score(&unknown, &unknown), 0.0);
    }

    #[test]
    fn engagement_saturates_at_one_hundred_views() {
        assert_eq!(engagement_score(0), 0.0);
        assert!((engagement_score(50) - 7.5).abs() < 1e-9);
        assert_eq!(engagement_score(100), 15.0);
        assert_eq!(engagement_score(5_000), 15.0);
    }

    #[test]
    fn freshness_steps_down_with_age() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(freshness_score(now - Duration::days(3), now), 15.0);
        assert_eq!(freshness_score(now - Duration::days(7), now), 10.0);
        assert_eq!(freshness_score(now - Duration::days(29), now), 10.0);
        assert_eq!(freshness_score(now - Duration::days(60), now), 5.0);
        assert_eq!(freshness_score(now - Duration::days(365), now), 0.0);
    }

    #[test]
    fn attribute_similarity_matches_reference_example() {
        let left = attrs(&[
            ("color", AttributeValue::Text("black".to_string())),
            ("storage_gb", AttributeValue::Number(128.0)),
            ("dual_sim", AttributeValue::Boolean(true)),
        ]);
        let right = attrs(&[
            ("color", AttributeValue::Text("black".to_string())),
            ("storage_gb", AttributeValue::Number(130.0)),
            ("warranty", AttributeValue::Boolean(false)),
        ]);

        let similarity = attribute_similarity(&left, &right);
        assert!((similarity - 0.5).abs() < 1e-9, "got {similarity}");
    }

    #[test]
    fn attribute_similarity_reads_numbers_with_units_from_text() {
        let left = attrs(&[("mileage", AttributeValue::Text("120,000 km".to_string()))]);
        let right = attrs(&[("mileage", AttributeValue::Number(125_000.0))]);
        assert_eq!(attribute_similarity(&left, &right), 1.0);

        let far = attrs(&[("mileage", AttributeValue::Number(200_000.0))]);
        assert_eq!(attribute_similarity(&left, &far), 0.0);
    }

    #[test]
    fn attribute_similarity_is_zero_for_empty_sets_and_zero_average() {
        let some = attrs(&[("size", AttributeValue::Number(0.0))]);
        assert_eq!(attribute_similarity(&some, &AttributeSet::new()), 0.0);
        assert_eq!(attribute_similarity(&AttributeSet::new(), &some), 0.0);

        let negative = attrs(&[("size", AttributeValue::Number(-1.0))]);
        let other_negative = attrs(&[("size", AttributeValue::Number(-1.05))]);
        assert_eq!(attribute_similarity(&negative, &other_negative), 0.0);
        assert_eq!(attribute_similarity(&some, &some), 1.0);
    }

    #[test]
    fn price_affinity_ignores_free_items() {
        let affinity = price_affinity([0.0, 100.0, 300.0]).expect("affinity");
        assert_eq!(affinity.samples, 2);
        assert_eq!(affinity.average, 200.0);
        assert_eq!(affinity.min, 100.0);
        assert_eq!(affinity.max, 300.0);

        assert!(price_affinity([0.0]).is_none());
        assert!(price_affinity(std::iter::empty()).is_none());
    }

    #[test]
    fn price_buckets_follow_average_bands() {
        let affinity = PriceAffinity { average: 1000.0, min: 500.0, max: 1500.0, samples: 2 };
        assert_eq!(price_bucket(950.0, Some(&affinity)), 30.0);
        assert_eq!(price_bucket(1150.0, Some(&affinity)), 30.0);
        assert_eq!(price_bucket(1400.0, Some(&affinity)), 20.0);
        assert_eq!(price_bucket(500.0, Some(&affinity)), 20.0);
        assert_eq!(price_bucket(3000.0, Some(&affinity)), 10.0);
        assert_eq!(price_bucket(3000.0, None), 20.0);
    }

    #[test]
    fn trend_score_weights_each_signal() {
        let summary = EngagementSummary {
            total_views: 10,
            unique_viewers: 4,
            favorites: 2,
            phone_clicks: 1,
            avg_view_duration: 30.0,
        };
        let score = trend_score(&summary, &TrendWeights::default());
        assert!((score - (2.0 + 1.2 + 0.5 + 0.15 + 3.0)).abs() < 1e-9, "got {score}");
        assert_eq!(trend_score(&EngagementSummary::default(), &TREND_WEIGHTS), 0.0);
    }
}
