use serde::Serialize;

use crate::aggregator::utility::mean;
use crate::metrics::{MetricSource, pct};

/// Totals and ratios over the currently selected areas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub area: String,
    pub area_count: usize,
    pub market_share_2023: f64,
    pub population: f64,
    pub deaths_2023: f64,
    pub services_2023: f64,
    pub services_2024: f64,
    pub services_2025: f64,
    pub insured_count: f64,
    pub insured_percentage: f64,
    pub mean_travel_time: f64,
}

/// One `Kenmerk,Waarde` line of the summary export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryLine {
    #[serde(rename = "Kenmerk")]
    pub label: &'static str,
    #[serde(rename = "Waarde")]
    pub value: String,
}

impl SummaryStats {
    /// Sums counters over `rows` and recomputes both ratios from the sums.
    pub fn from_rows<T: MetricSource>(area: impl Into<String>, rows: &[T]) -> Self {
        let mut s = SummaryStats {
            area: area.into(),
            area_count: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let c = row.counters();
            s.population += c.population;
            s.deaths_2023 += c.deaths_2023;
            s.services_2023 += c.services_2023;
            s.services_2024 += c.services_2024;
            s.services_2025 += c.services_2025;
            s.insured_count += c.insured_count;
        }

        let travel: Vec<f64> = rows.iter().map(|r| r.counters().travel_time_minutes).collect();
        s.mean_travel_time = mean(&travel);
        s.market_share_2023 = pct(s.services_2023, s.deaths_2023);
        s.insured_percentage = pct(s.insured_count, s.population);
        s
    }

    /// The fixed two-column table, rounded the way it is exported.
    pub fn table(&self) -> Vec<SummaryLine> {
        let line = |label, value| SummaryLine { label, value };
        vec![
            line("Gebied", self.area.clone()),
            line("Aantal PC4-gebieden", self.area_count.to_string()),
            line("Marktaandeel 2023 (%)", decimal(self.market_share_2023, 2)),
            line("Totaal inwoners", whole(self.population)),
            line("Sterfte 2023", whole(self.deaths_2023)),
            line("Uitvaarten 2023", whole(self.services_2023)),
            line("Uitvaarten 2024", whole(self.services_2024)),
            line("Uitvaarten 2025", whole(self.services_2025)),
            line("Aantal verzekerden", whole(self.insured_count)),
            line("Percentage verzekerden (%)", decimal(self.insured_percentage, 2)),
            line("Gemiddelde reistijd (min)", decimal(self.mean_travel_time, 1)),
        ]
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// Debug keeps the trailing ".0" on whole numbers.
fn decimal(value: f64, decimals: i32) -> String {
    format!("{:?}", round_to(value, decimals))
}

fn whole(value: f64) -> String {
    (value.trunc() as i64).to_string()
}

/// One area in a market-share ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedArea {
    pub area: String,
    pub municipality: Option<String>,
    pub locality: Option<String>,
    pub market_share: f64,
    pub insured_percentage: f64,
    pub deaths_2023: f64,
    pub services_2023: f64,
}

impl RankedArea {
    fn from_source<T: MetricSource>(row: &T) -> Self {
        let derived = row.derived();
        RankedArea {
            area: row.area_label().to_string(),
            municipality: row.municipality().map(str::to_string),
            locality: row.locality().map(str::to_string),
            market_share: derived.market_share_2023,
            insured_percentage: derived.insured_percentage,
            deaths_2023: row.counters().deaths_2023,
            services_2023: row.counters().services_2023,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rankings {
    pub top: Vec<RankedArea>,
    pub bottom: Vec<RankedArea>,
}

/// Highest and lowest `n` areas by market share.
///
/// Only areas with at least one death take part; ties keep input order.
pub fn rank_by_market_share<T: MetricSource>(rows: &[T], n: usize) -> Rankings {
    let mut eligible: Vec<RankedArea> = rows
        .iter()
        .filter(|r| r.counters().deaths_2023 > 0.0)
        .map(RankedArea::from_source)
        .collect();

    eligible.sort_by(|a, b| a.market_share.total_cmp(&b.market_share));
    let bottom = eligible.iter().take(n).cloned().collect();

    eligible.sort_by(|a, b| b.market_share.total_cmp(&a.market_share));
    let top = eligible.into_iter().take(n).collect();

    Rankings { top, bottom }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::with_derived_metrics;
    use crate::model::{Attribute, Counter, Dataset, PostalAreaRecord};
    use geo::MultiPolygon;

    fn record(pc4: &str, deaths: f64, services: f64) -> PostalAreaRecord {
        PostalAreaRecord::new(pc4, MultiPolygon::new(vec![]))
            .with_attribute(Attribute::Municipality, "Amsterdam")
            .with_counter(Counter::Deaths2023, deaths)
            .with_counter(Counter::Services2023, services)
    }

    fn rows(records: Vec<PostalAreaRecord>) -> Vec<PostalAreaRecord> {
        with_derived_metrics(Dataset {
            records,
            ..Default::default()
        })
        .records
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(12.345_6, 2), 12.35);
        assert_eq!(round_to(7.25, 1), 7.3);
        assert_eq!(round_to(20.0, 2), 20.0);
    }

    #[test]
    fn test_summary_recomputes_ratios_from_totals() {
        let rows = rows(vec![
            record("1011", 10.0, 5.0)
                .with_counter(Counter::Population, 1000.0)
                .with_counter(Counter::InsuredCount, 100.0)
                .with_counter(Counter::TravelTimeMinutes, 10.0),
            record("1012", 30.0, 3.0)
                .with_counter(Counter::Population, 3000.0)
                .with_counter(Counter::InsuredCount, 300.0)
                .with_counter(Counter::TravelTimeMinutes, 15.0),
        ]);
        let stats = SummaryStats::from_rows("Heel Nederland", &rows);

        assert_eq!(stats.area_count, 2);
        assert_eq!(stats.deaths_2023, 40.0);
        assert_eq!(stats.market_share_2023, 20.0);
        assert_eq!(stats.insured_percentage, 10.0);
        assert_eq!(stats.mean_travel_time, 12.5);
    }

    #[test]
    fn test_summary_of_nothing_is_zero() {
        let stats = SummaryStats::from_rows::<PostalAreaRecord>("Heel Nederland", &[]);
        assert_eq!(stats.area_count, 0);
        assert_eq!(stats.market_share_2023, 0.0);
        assert_eq!(stats.mean_travel_time, 0.0);
    }

    #[test]
    fn test_summary_table_labels_and_rounding() {
        let stats = SummaryStats {
            area: "Gemeente(n): Amsterdam".to_string(),
            area_count: 3,
            market_share_2023: 33.333_333,
            population: 1234.9,
            mean_travel_time: 17.46,
            ..Default::default()
        };
        let table = stats.table();

        assert_eq!(table.len(), 11);
        assert_eq!(table[0].label, "Gebied");
        assert_eq!(table[0].value, "Gemeente(n): Amsterdam");
        assert_eq!(table[2].label, "Marktaandeel 2023 (%)");
        assert_eq!(table[2].value, "33.33");
        assert_eq!(table[3].value, "1234");
        assert_eq!(table[9].value, "0.0");
        assert_eq!(table[10].label, "Gemiddelde reistijd (min)");
        assert_eq!(table[10].value, "17.5");
    }

    #[test]
    fn test_rankings_skip_areas_without_deaths() {
        let rows = rows(vec![
            record("1011", 10.0, 1.0),
            record("1012", 10.0, 5.0),
            record("1013", 0.0, 0.0),
            record("1014", 10.0, 3.0),
        ]);
        let ranked = rank_by_market_share(&rows, 2);

        let top: Vec<_> = ranked.top.iter().map(|r| r.area.as_str()).collect();
        let bottom: Vec<_> = ranked.bottom.iter().map(|r| r.area.as_str()).collect();
        assert_eq!(top, vec!["1012", "1014"]);
        assert_eq!(bottom, vec!["1011", "1014"]);
        assert_eq!(ranked.top[0].municipality.as_deref(), Some("Amsterdam"));
    }

    #[test]
    fn test_rankings_shorter_than_n() {
        let rows = rows(vec![record("1011", 10.0, 1.0)]);
        let ranked = rank_by_market_share(&rows, 5);
        assert_eq!(ranked.top.len(), 1);
        assert_eq!(ranked.bottom.len(), 1);
    }
}
