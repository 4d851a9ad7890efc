//! Column names used by the PC4 source files and the CSV exports.
//! The source spreadsheets are Dutch, so the wire names are too.

// ── Join key ────────────────────────────────────────────────────────────────
pub const PC4: &str = "PC4";

/// Substrings that mark a boundary property as a likely postcode key.
pub const KEY_HINTS: [&str; 2] = ["pc", "post"];

/// Label used for missing categorical values in filter options.
pub const UNKNOWN_LABEL: &str = "Onbekend";

// ── Categorical columns ─────────────────────────────────────────────────────
pub mod categorical {
    pub const PROVINCE: &str = "provincie";
    pub const MUNICIPALITY: &str = "gemeente";
    pub const LOCALITY: &str = "woonplaats";
    pub const CLUSTER: &str = "cluster";
    pub const PROPOSED_BRANCH: &str = "voorstel_benaming_uvb";
    pub const PROPOSED_COMPANY: &str = "voorstel_onderneming";
}

// ── Numeric counter columns ─────────────────────────────────────────────────
pub mod counters {
    pub const POPULATION: &str = "inwoners";
    pub const DEATHS_2023: &str = "sterfte_2023";
    pub const SERVICES_2023: &str = "uitvaarten_2023";
    pub const SERVICES_2024: &str = "uitvaarten_2024";
    pub const SERVICES_2025: &str = "uitvaarten_2025";
    pub const INSURED_COUNT: &str = "aantal_verzekerden";
    pub const TRAVEL_TIME_MINUTES: &str = "reistijd_min";
}

// ── Derived columns ─────────────────────────────────────────────────────────
pub mod derived {
    pub const MARKET_SHARE_2023: &str = "berekend_marktaandeel_2023";
    pub const INSURED_PERCENTAGE: &str = "percentage_verzekerden";

    pub const ALL: [&str; 2] = [MARKET_SHARE_2023, INSURED_PERCENTAGE];
}

// ── Municipality export ─────────────────────────────────────────────────────
pub mod municipality {
    pub const AREA_COUNT: &str = "aantal_pc4";
    pub const GEOMETRY_TYPE: &str = "geometrie";
}
