use approx::assert_abs_diff_eq;
use geostat::autocorrelation::{self, AutocorrelationOptions};
use geostat::pca::{self, PcaModel, PcaOptions};
use geostat::table::{self, Cell, ReadOptions, Table};
use geostat::water_mass::{convert_to_volume, total_mass_tg};
use geostat::Raster;
use tempfile::TempDir;

/// Jittered 7x7 grid of stations with a smooth trend column and a
/// scrambled one, stored under year headers.
fn station_table() -> Table {
    let mut table = Table::new(["id", "lon", "lat", "2001", "2002"]);
    let mut k = 0i64;
    for r in 0..7 {
        for c in 0..7 {
            let lon = 110.0 + c as f64 + 0.05 * ((k * 7 % 11) as f64 / 11.0);
            let lat = 30.0 + r as f64 + 0.05 * ((k * 5 % 13) as f64 / 13.0);
            let trend = (r + c) as f64 + 0.1 * ((k * 3 % 7) as f64);
            let scrambled = ((k * 37 + 11) % 17) as f64;
            table
                .push_row(vec![
                    Cell::Int(k),
                    Cell::from(lon),
                    Cell::from(lat),
                    Cell::from(trend),
                    Cell::from(scrambled),
                ])
                .unwrap();
            k += 1;
        }
    }
    table
}

#[test]
fn test_autocorrelation_from_csv() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("stations.csv");
    table::write_table(&input, &station_table()).unwrap();
    let table = table::read_table(&input, &ReadOptions::default()).unwrap();

    let options = AutocorrelationOptions {
        permutations: 199,
        ..Default::default()
    };
    let report = autocorrelation::analyze(&table, &options).unwrap();

    let names: Vec<&str> = report.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["2001", "2002"]);
    assert_eq!(report.points.len(), 49);
    assert!(report.islands.is_empty());

    let trend = &report.variables[0];
    assert!(trend.moran.i > 0.5, "Moran's I = {}", trend.moran.i);
    assert!(trend.moran_p() <= 0.01);
    assert!(trend.geary.c < 0.5, "Geary's C = {}", trend.geary.c);
    assert_eq!(trend.local.is.len(), 49);

    let summary = report.summary_table();
    assert_eq!(
        summary.columns,
        vec!["Variable", "Moran_I", "Z_score", "P_value", "Geary_C", "Geary_p"]
    );
    assert_eq!(summary.n_rows(), 2);

    let workbook = temp_dir.path().join("summary.xlsx");
    table::write_workbook(&workbook, &[("Sheet1", &summary)]).unwrap();
    let read = table::read_table(&workbook, &ReadOptions::default()).unwrap();
    assert_eq!(read.columns, summary.columns);
    assert_eq!(read.rows[1][0], Cell::from("2002"));
    assert_abs_diff_eq!(
        read.rows[0][1].as_f64().unwrap(),
        trend.moran.i,
        epsilon = 1e-9
    );
}

#[test]
fn test_autocorrelation_is_reproducible() {
    let table = station_table();
    let options = AutocorrelationOptions {
        variables: vec!["2002".to_string()],
        permutations: 99,
        seed: 7,
        ..Default::default()
    };
    let a = autocorrelation::analyze(&table, &options).unwrap();
    let b = autocorrelation::analyze(&table, &options).unwrap();
    assert_eq!(a.variables[0].moran.p_sim(), b.variables[0].moran.p_sim());
    assert_eq!(a.variables[0].local.p_sim, b.variables[0].local.p_sim);
}

fn two_factor_table() -> Table {
    let mut table = Table::new(["site", "a1", "a2", "a3", "b1", "b2", "b3"]);
    for i in 0..60 {
        let t = i as f64;
        let f1 = (t * 0.9).sin() * 2.5;
        let f2 = (t * 0.4).cos() * 1.5;
        let e = |k: f64| (t * (3.11 + 0.37 * k) + k).sin() * 0.15;
        table
            .push_row(vec![
                Cell::from(format!("s{}", i)),
                Cell::from(f1 + e(1.0)),
                Cell::from(0.8 * f1 + e(2.0)),
                Cell::from(-f1 + e(3.0)),
                Cell::from(f2 + e(4.0)),
                Cell::from(1.2 * f2 + e(5.0)),
                Cell::from(0.9 * f2 + e(6.0)),
            ])
            .unwrap();
    }
    table
}

#[test]
fn test_pca_tables_from_csv() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("drivers.csv");
    table::write_table(&input, &two_factor_table()).unwrap();
    let table = table::read_table(&input, &ReadOptions::default()).unwrap();

    let data = pca::prepare(&table).unwrap();
    let model = PcaModel::fit(&data.standardized, data.variables.clone(), &PcaOptions::default()).unwrap();
    assert_eq!(model.n_components(), 2);
    assert!(model.bartlett.p_value < 0.05);

    let tables = pca::build_tables(&model, &data).unwrap();
    assert_eq!(tables.loadings.columns, vec!["Variable", "PC1", "PC2"]);
    assert_eq!(tables.loadings.n_rows(), 6);
    assert_eq!(tables.scores.n_rows(), 60);
    assert_eq!(tables.regression_scores.rows[3][0], Cell::from("s3"));

    let component_of = |name: &str| -> Cell {
        tables
            .assignments
            .rows
            .iter()
            .find(|r| r[0] == Cell::from(name))
            .map(|r| r[1].clone())
            .unwrap()
    };
    assert_eq!(component_of("a1"), component_of("a2"));
    assert_eq!(component_of("a1"), component_of("a3"));
    assert_eq!(component_of("b1"), component_of("b3"));
    assert_ne!(component_of("a1"), component_of("b1"));

    let a3 = tables
        .assignments
        .rows
        .iter()
        .find(|r| r[0] == Cell::from("a3"))
        .unwrap();
    let a1 = tables
        .assignments
        .rows
        .iter()
        .find(|r| r[0] == Cell::from("a1"))
        .unwrap();
    assert_ne!(a1[3], a3[3]);

    let cumulative = tables.explained_variance.numeric_column("Cumulative%").unwrap();
    assert!(cumulative[1] > 90.0);
}

#[test]
fn test_water_mass_totals() {
    let depth = Raster::new(
        2,
        2,
        vec![1.0, 2.0, -9999.0, 3.0],
        [0.0, 1000.0, 0.0, 0.0, 0.0, -1000.0],
        String::new(),
        Some(-9999.0),
    )
    .unwrap();
    let volume = convert_to_volume(&depth).unwrap();
    assert_eq!(volume.values[0], 1000.0);
    assert_eq!(volume.values[2], -9999.0);
    assert_abs_diff_eq!(total_mass_tg(&volume), 6e-6, epsilon = 1e-15);
}
