//! Core data types shared by the loader, filters, aggregator and exports.

use crate::metrics::DerivedMetrics;
use crate::schema::{categorical, counters};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Categorical attribute columns a postcode row may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Province,
    Municipality,
    Locality,
    Cluster,
    ProposedBranch,
    ProposedCompany,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::Province,
        Attribute::Municipality,
        Attribute::Locality,
        Attribute::Cluster,
        Attribute::ProposedBranch,
        Attribute::ProposedCompany,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Attribute::Province => categorical::PROVINCE,
            Attribute::Municipality => categorical::MUNICIPALITY,
            Attribute::Locality => categorical::LOCALITY,
            Attribute::Cluster => categorical::CLUSTER,
            Attribute::ProposedBranch => categorical::PROPOSED_BRANCH,
            Attribute::ProposedCompany => categorical::PROPOSED_COMPANY,
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.column() == name)
    }
}

/// Raw numeric counters recognised in the tabular source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Population,
    Deaths2023,
    Services2023,
    Services2024,
    Services2025,
    InsuredCount,
    TravelTimeMinutes,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::Population,
        Counter::Deaths2023,
        Counter::Services2023,
        Counter::Services2024,
        Counter::Services2025,
        Counter::InsuredCount,
        Counter::TravelTimeMinutes,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Counter::Population => counters::POPULATION,
            Counter::Deaths2023 => counters::DEATHS_2023,
            Counter::Services2023 => counters::SERVICES_2023,
            Counter::Services2024 => counters::SERVICES_2024,
            Counter::Services2025 => counters::SERVICES_2025,
            Counter::InsuredCount => counters::INSURED_COUNT,
            Counter::TravelTimeMinutes => counters::TRAVEL_TIME_MINUTES,
        }
    }

    pub fn from_column(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.column() == name)
    }

    /// Travel time is averaged when rows are combined; everything else is a count.
    pub fn is_summed(self) -> bool {
        !matches!(self, Counter::TravelTimeMinutes)
    }
}

/// Counter values for one area. Missing source columns read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Counters {
    pub population: f64,
    pub deaths_2023: f64,
    pub services_2023: f64,
    pub services_2024: f64,
    pub services_2025: f64,
    pub insured_count: f64,
    pub travel_time_minutes: f64,
}

impl Counters {
    pub fn get(&self, counter: Counter) -> f64 {
        match counter {
            Counter::Population => self.population,
            Counter::Deaths2023 => self.deaths_2023,
            Counter::Services2023 => self.services_2023,
            Counter::Services2024 => self.services_2024,
            Counter::Services2025 => self.services_2025,
            Counter::InsuredCount => self.insured_count,
            Counter::TravelTimeMinutes => self.travel_time_minutes,
        }
    }

    pub fn set(&mut self, counter: Counter, value: f64) {
        let slot = match counter {
            Counter::Population => &mut self.population,
            Counter::Deaths2023 => &mut self.deaths_2023,
            Counter::Services2023 => &mut self.services_2023,
            Counter::Services2024 => &mut self.services_2024,
            Counter::Services2025 => &mut self.services_2025,
            Counter::InsuredCount => &mut self.insured_count,
            Counter::TravelTimeMinutes => &mut self.travel_time_minutes,
        };
        *slot = value;
    }
}

/// One joined row: a PC4 area with its statistics and boundary polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct PostalAreaRecord {
    pub pc4: String,
    pub attributes: BTreeMap<Attribute, String>,
    pub counters: Counters,
    /// Numeric source columns outside the recognised counter set.
    pub extras: BTreeMap<String, f64>,
    pub derived: DerivedMetrics,
    pub geometry: MultiPolygon<f64>,
}

impl PostalAreaRecord {
    pub fn new(pc4: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            pc4: pc4.into(),
            attributes: BTreeMap::new(),
            counters: Counters::default(),
            extras: BTreeMap::new(),
            derived: DerivedMetrics::default(),
            geometry,
        }
    }

    pub fn attribute(&self, attribute: Attribute) -> Option<&str> {
        self.attributes.get(&attribute).map(String::as_str)
    }

    pub fn municipality(&self) -> Option<&str> {
        self.attribute(Attribute::Municipality)
    }

    pub fn with_attribute(mut self, attribute: Attribute, value: impl Into<String>) -> Self {
        self.attributes.insert(attribute, value.into());
        self
    }

    pub fn with_counter(mut self, counter: Counter, value: f64) -> Self {
        self.counters.set(counter, value);
        self
    }
}

/// The joined postcode table together with the schema it was loaded from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<PostalAreaRecord>,
    /// Categorical columns found in the tabular source.
    pub attributes: BTreeSet<Attribute>,
    /// Counter columns found in the tabular source (before zero-filling).
    pub counters: BTreeSet<Counter>,
    /// Extra numeric columns, in source order.
    pub extra_columns: Vec<String>,
}

impl Dataset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_attribute(&self, attribute: Attribute) -> bool {
        self.attributes.contains(&attribute)
    }

    /// Builds a dataset with the same schema around a different set of rows.
    pub fn with_records(&self, records: Vec<PostalAreaRecord>) -> Self {
        Self {
            records,
            attributes: self.attributes.clone(),
            counters: self.counters.clone(),
            extra_columns: self.extra_columns.clone(),
        }
    }
}

/// Which geographic level a view is rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    #[default]
    Postcode,
    Municipality,
}
