use flate2::Compression;
use flate2::write::GzEncoder;
use geo::Area;
use pc4_dashboard::aggregator::{AggregateGeometry, GeometryQuality, aggregate_to_municipality};
use pc4_dashboard::fetch::{BasicClient, SourceBytes, SourceLocation};
use pc4_dashboard::filter::FilterSelection;
use pc4_dashboard::geometry::GeometrySettings;
use pc4_dashboard::metrics::Metric;
use pc4_dashboard::model::{Counter, Dataset};
use pc4_dashboard::output::{export_records, map_layer};
use pc4_dashboard::session::Session;
use pc4_dashboard::stats::{SummaryStats, rank_by_market_share};
use std::collections::BTreeSet;
use std::io::Write;
use std::{env, fs};

const TABLE: &[u8] = include_bytes!("fixtures/pc4_table.csv");
const BOUNDARIES: &[u8] = include_bytes!("fixtures/pc4_boundaries.geojson");

fn fixture_dataset() -> Dataset {
    let mut session = Session::default();
    let table = SourceBytes::new(SourceLocation::parse("pc4_table.csv"), TABLE.to_vec()).unwrap();
    let boundaries =
        SourceBytes::new(SourceLocation::parse("pc4_boundaries.geojson"), BOUNDARIES.to_vec()).unwrap();
    session.load_bytes(table, boundaries).clone()
}

fn pc4s(dataset: &Dataset) -> Vec<&str> {
    dataset.records.iter().map(|r| r.pc4.as_str()).collect()
}

#[test]
fn test_full_pipeline() {
    let dataset = fixture_dataset();

    // 4000 has no boundary, 9999 has no table row.
    assert_eq!(pc4s(&dataset), vec!["1011", "1012", "1013", "1501", "3011", "3012"]);
    assert_eq!(dataset.extra_columns, vec!["ziekenhuizen".to_string()]);
    assert_eq!(Metric::available(&dataset).len(), Metric::ALL.len());

    let stats = SummaryStats::from_rows("Heel Nederland", &dataset.records);
    assert_eq!(stats.area_count, 6);
    assert_eq!(stats.deaths_2023, 230.0);
    assert_eq!(stats.services_2023, 49.0);
    assert_eq!(stats.population, 25000.0);
    assert!((stats.insured_percentage - 13.2).abs() < 1e-9);
    assert_eq!(stats.table()[2].value, "21.3");
}

#[test]
fn test_filtered_summary_and_rankings() {
    let dataset = fixture_dataset();
    let selection = FilterSelection {
        province: BTreeSet::from(["Noord-Holland".to_string()]),
        ..Default::default()
    };
    let filtered = selection.apply(&dataset);

    assert_eq!(pc4s(&filtered), vec!["1011", "1012", "1013", "1501"]);
    assert_eq!(selection.area_label(), "Provincie(s): Noord-Holland");

    let ranked = rank_by_market_share(&dataset.records, 5);
    let top: Vec<_> = ranked.top.iter().map(|r| r.area.as_str()).collect();
    let bottom: Vec<_> = ranked.bottom.iter().map(|r| r.area.as_str()).collect();
    // 1013 has no deaths and is never ranked.
    assert_eq!(top, vec!["3011", "1501", "1011", "3012", "1012"]);
    assert_eq!(bottom, vec!["1012", "3012", "1011", "1501", "3011"]);
}

#[test]
fn test_municipality_level() {
    let dataset = fixture_dataset();
    let view = aggregate_to_municipality(&dataset, &GeometrySettings::default()).unwrap();

    assert_eq!(view.quality, GeometryQuality::Dissolved);
    let names: Vec<_> = view.rows.iter().map(|r| r.municipality.as_str()).collect();
    assert_eq!(names, vec!["Amsterdam", "Zaanstad", "Rotterdam"]);

    let amsterdam = &view.rows[0];
    assert_eq!(amsterdam.area_count, 3);
    assert_eq!(amsterdam.counters.get(Counter::Deaths2023), 100.0);
    assert_eq!(amsterdam.derived.market_share_2023, 15.0);
    assert_eq!(amsterdam.counters.travel_time_minutes, 12.0);
    assert_eq!(amsterdam.extras.get("ziekenhuizen"), Some(&1.0));
    match &amsterdam.geometry {
        Some(AggregateGeometry::Polygon(mp)) => assert!((mp.unsigned_area() - 0.03).abs() < 1e-6),
        other => panic!("expected dissolved polygon, got {other:?}"),
    }

    let ranked = rank_by_market_share(&view.rows, 5);
    assert_eq!(ranked.top[0].area, "Zaanstad");
    assert_eq!(ranked.bottom[0].area, "Amsterdam");
}

#[test]
fn test_map_layer_and_export() {
    let dataset = fixture_dataset();

    let layer = map_layer(&dataset.records, Metric::MarketShare2023);
    let features = layer["features"].as_array().unwrap();
    assert_eq!(features.len(), 6);
    assert_eq!(features[4]["properties"]["PC4"], "3011");
    assert_eq!(features[4]["properties"]["value"], 40.0);

    let path = format!("{}/pc4_dashboard_it_records.csv", env::temp_dir().display());
    let _ = fs::remove_file(&path);
    export_records(&path, &dataset).unwrap();
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 7);
    assert!(content.lines().next().unwrap().starts_with("PC4,provincie,gemeente,woonplaats,cluster,"));
    fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_session_loads_gzipped_table_from_disk() {
    let dir = env::temp_dir();
    let table_path = format!("{}/pc4_dashboard_it_table.csv.gz", dir.display());
    let boundary_path = format!("{}/pc4_dashboard_it_boundaries.geojson", dir.display());

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(TABLE).unwrap();
    fs::write(&table_path, encoder.finish().unwrap()).unwrap();
    fs::write(&boundary_path, BOUNDARIES).unwrap();

    let client = BasicClient::new().unwrap();
    let mut session = Session::default();
    let table = SourceLocation::parse(&table_path);
    let boundaries = SourceLocation::parse(&boundary_path);

    assert_eq!(session.load(&client, &table, &boundaries).await.len(), 6);
    assert_eq!(session.load(&client, &table, &boundaries).await.len(), 6);
    assert_eq!(session.parse_count(), 1);
    assert!(session.last_error().is_none());

    fs::remove_file(&table_path).unwrap();
    fs::remove_file(&boundary_path).unwrap();
}
