//! Ratio metrics derived from raw counters, and the metric selector.

use crate::model::{Counter, Counters, Dataset, PostalAreaRecord};
use crate::schema::derived;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Percentage of `part` in `total`; 0 when the denominator is not positive.
pub fn pct(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub market_share_2023: f64,
    pub insured_percentage: f64,
}

impl DerivedMetrics {
    /// Always computed from counter totals, so it stays correct after summing.
    pub fn from_counters(counters: &Counters) -> Self {
        Self {
            market_share_2023: pct(counters.services_2023, counters.deaths_2023),
            insured_percentage: pct(counters.insured_count, counters.population),
        }
    }
}

/// Fills in the derived ratio columns for every record. Idempotent.
pub fn with_derived_metrics(mut dataset: Dataset) -> Dataset {
    for record in &mut dataset.records {
        record.derived = DerivedMetrics::from_counters(&record.counters);
    }
    dataset
}

/// Anything that can be shown as one area in a table, ranking or map.
pub trait MetricSource {
    fn area_label(&self) -> &str;
    fn counters(&self) -> &Counters;
    fn derived(&self) -> DerivedMetrics;
    fn municipality(&self) -> Option<&str>;
    fn locality(&self) -> Option<&str>;
}

impl MetricSource for PostalAreaRecord {
    fn area_label(&self) -> &str {
        &self.pc4
    }

    fn counters(&self) -> &Counters {
        &self.counters
    }

    fn derived(&self) -> DerivedMetrics {
        self.derived
    }

    fn municipality(&self) -> Option<&str> {
        PostalAreaRecord::municipality(self)
    }

    fn locality(&self) -> Option<&str> {
        self.attribute(crate::model::Attribute::Locality)
    }
}

/// Metrics the user can pick for map colouring and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Metric {
    #[default]
    MarketShare2023,
    Counter(Counter),
    InsuredPercentage,
}

impl Metric {
    /// Selector order, matching the dashboard's dropdown.
    pub const ALL: [Metric; 9] = [
        Metric::MarketShare2023,
        Metric::Counter(Counter::Population),
        Metric::Counter(Counter::Deaths2023),
        Metric::Counter(Counter::Services2023),
        Metric::Counter(Counter::Services2024),
        Metric::Counter(Counter::Services2025),
        Metric::Counter(Counter::InsuredCount),
        Metric::InsuredPercentage,
        Metric::Counter(Counter::TravelTimeMinutes),
    ];

    pub fn column(self) -> &'static str {
        match self {
            Metric::MarketShare2023 => derived::MARKET_SHARE_2023,
            Metric::InsuredPercentage => derived::INSURED_PERCENTAGE,
            Metric::Counter(c) => c.column(),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Metric::MarketShare2023 => "Marktaandeel 2023",
            Metric::InsuredPercentage => "Percentage Verzekerden",
            Metric::Counter(Counter::Population) => "Inwoners",
            Metric::Counter(Counter::Deaths2023) => "Sterfte 2023",
            Metric::Counter(Counter::Services2023) => "Uitvaarten 2023",
            Metric::Counter(Counter::Services2024) => "Uitvaarten 2024",
            Metric::Counter(Counter::Services2025) => "Uitvaarten 2025",
            Metric::Counter(Counter::InsuredCount) => "Aantal Verzekerden",
            Metric::Counter(Counter::TravelTimeMinutes) => "Reistijd (minuten)",
        }
    }

    pub fn value<S: MetricSource + ?Sized>(self, source: &S) -> f64 {
        match self {
            Metric::MarketShare2023 => source.derived().market_share_2023,
            Metric::InsuredPercentage => source.derived().insured_percentage,
            Metric::Counter(c) => source.counters().get(c),
        }
    }

    /// Metrics backed by the loaded data: present counters plus both ratios.
    pub fn available(dataset: &Dataset) -> Vec<Metric> {
        Self::ALL
            .into_iter()
            .filter(|m| match m {
                Metric::Counter(c) => dataset.counters.contains(c),
                _ => true,
            })
            .collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Metric {
    type Err = String;

    /// Accepts either the column name or the display name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.column() == needle || m.display_name().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|m| m.column()).collect();
                format!("unknown metric '{}', expected one of: {}", s, known.join(", "))
            })
    }
}
