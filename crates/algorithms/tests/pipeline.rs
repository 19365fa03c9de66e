//! End-to-end pipeline tests on GeoTIFF layers written to a temporary
//! directory: load the stack, read occurrences, score, write results.

use ecosdm_algorithms::central::CentralMethod;
use ecosdm_algorithms::correlation::{select_layers, CorrelationParams};
use ecosdm_algorithms::distance::DistanceMetric;
use ecosdm_algorithms::extract::{augment_occurrences, extract_from_source};
use ecosdm_algorithms::matrix::{raster_to_grid, raster_to_matrix};
use ecosdm_algorithms::model::{run_model, BioclimModel, DistanceModel, ModelKind};
use ecosdm_algorithms::pca::{pca, PcaParams};
use ecosdm_algorithms::sampling::{add_pseudo_absences, PseudoAbsenceParams};
use ecosdm_core::io::{read_geotiff, write_geotiff, RasterProfile};
use ecosdm_core::occurrence::{ColumnNames, GeoPoint, OccurrenceSet};
use ecosdm_core::stack::{load_stack, RasterSource};
use ecosdm_core::{GeoTransform, Raster, SdmContext, CRS};
use std::path::Path;

const NODATA: f64 = -9999.0;

/// Two 2x2 layers over [-50, -48] x [-10, -8], plus an ignored text file
fn write_layers(dir: &Path) {
    let transform = GeoTransform::new(-50.0, -8.0, 1.0, -1.0);
    for (name, values) in [
        ("bio1", vec![1.0, 2.0, 3.0, 4.0]),
        ("bio12", vec![10.0, 20.0, 30.0, 40.0]),
    ] {
        let mut raster = Raster::from_vec(values, 2, 2)
            .unwrap()
            .with_name(name)
            .with_transform(transform);
        raster.set_crs(Some(CRS::wgs84()));
        let mut profile = RasterProfile::for_raster(&raster);
        profile.nodata = Some(NODATA);
        write_geotiff(&raster, dir.join(format!("{}.tif", name)), &profile).unwrap();
    }
    std::fs::write(dir.join("README.txt"), "not a raster").unwrap();
}

fn write_occurrences(path: &Path) {
    std::fs::write(
        path,
        "species,decimalLatitude,decimalLongitude\n\
         Leopardus pardalis,-8.5,-49.5\n",
    )
    .unwrap();
}

#[test]
fn distance_pipeline_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_layers(dir.path());
    let csv = dir.path().join("occ.csv");
    write_occurrences(&csv);

    let source = RasterSource::from_path(dir.path()).unwrap();
    let stack = load_stack(&source).unwrap();
    assert_eq!(stack.names(), vec!["bio1", "bio12"]);

    let occ = OccurrenceSet::read_csv(&csv, &ColumnNames::default()).unwrap();
    let model = DistanceModel::new(DistanceMetric::Euclidean, CentralMethod::Mean);
    let out = run_model(&model, &stack, &occ, &SdmContext::new("pipeline")).unwrap();
    assert_eq!(out.kind, ModelKind::Euclidean);

    let result_path = dir.path().join("results").join("euclidean.tif");
    std::fs::create_dir_all(result_path.parent().unwrap()).unwrap();
    let profile = RasterProfile::for_raster(&out.surface);
    write_geotiff(&out.surface, &result_path, &profile).unwrap();

    let back = read_geotiff(&result_path).unwrap();
    let expected = [0.0, 101f64.sqrt(), 404f64.sqrt(), 909f64.sqrt()];
    for (v, e) in back.data().iter().zip(expected) {
        // float32 storage
        assert!((v - e).abs() < 1e-4, "{} vs {}", v, e);
    }
    assert_eq!(back.crs(), Some(&CRS::Epsg(4326)));
    assert_eq!(back.transform(), stack.transform());
}

#[test]
fn bioclim_and_augmentation() {
    let dir = tempfile::tempdir().unwrap();
    write_layers(dir.path());
    let stack = load_stack(&RasterSource::Directory(dir.path().to_path_buf())).unwrap();

    let mut occ = OccurrenceSet::from_coordinates(&[
        GeoPoint::new(-49.5, -8.5),
        GeoPoint::new(-48.5, -8.5),
        GeoPoint::new(-60.0, 0.0),
    ]);
    augment_occurrences(&mut occ, &stack, &SdmContext::default()).unwrap();
    assert_eq!(occ.covariate("bio1").unwrap()[..2], [1.0, 2.0]);
    assert!(occ.covariate("bio12").unwrap()[2].is_nan());

    let out = run_model(&BioclimModel, &stack, &occ, &SdmContext::default()).unwrap();
    let suit = out.surface.data();
    assert_eq!(suit[(0, 0)], 1.0);
    assert_eq!(suit[(0, 1)], 1.0);
    assert_eq!(suit[(1, 0)], 0.0);
    assert_eq!(out.extras[0].data()[(0, 1)], 1.0);
}

#[test]
fn pseudo_absences_and_csv_output() {
    let dir = tempfile::tempdir().unwrap();
    write_layers(dir.path());
    let csv = dir.path().join("occ.csv");
    write_occurrences(&csv);

    let stack = load_stack(&RasterSource::from_path(dir.path()).unwrap()).unwrap();
    let mut occ = OccurrenceSet::read_csv(&csv, &ColumnNames::default()).unwrap();
    let params = PseudoAbsenceParams {
        count: Some(5),
        seed: Some(2024),
        ..Default::default()
    };
    assert_eq!(add_pseudo_absences(&mut occ, &stack, &params, &SdmContext::default()).unwrap(), 5);
    assert_eq!(occ.labels().iter().filter(|&&p| p == 0).count(), 5);

    let out = dir.path().join("occ_with_absences.csv");
    occ.write_csv(&out, &ColumnNames::default()).unwrap();
    let back = OccurrenceSet::read_csv(&out, &ColumnNames::default()).unwrap();
    assert_eq!(back.len(), 6);
    assert_eq!(back.presence_count(), 1);
}

#[test]
fn matrix_views_and_extraction_from_files() {
    let dir = tempfile::tempdir().unwrap();
    write_layers(dir.path());
    let source = RasterSource::from_path(dir.path()).unwrap();

    let ctx = SdmContext::new("matrix views");
    let grid = raster_to_grid(&source, &ctx).unwrap();
    assert_eq!(grid.data().dim(), (2, 2, 2));

    let flat = raster_to_matrix(&source, &ctx).unwrap();
    assert_eq!(flat.data.dim(), (2, 4));

    let values = extract_from_source(&[GeoPoint::new(-48.5, -9.5)], &source, &ctx).unwrap();
    assert_eq!(values.row(0).to_vec(), vec![4.0, 40.0]);

    let report = select_layers(&grid, &CorrelationParams::default(), &ctx).unwrap();
    assert_eq!(report.kept.len(), 1);
}

#[test]
fn pca_components_written_with_nan_nodata() {
    let dir = tempfile::tempdir().unwrap();
    write_layers(dir.path());
    let ctx = SdmContext::new("pca");
    let grid = raster_to_grid(&RasterSource::from_path(dir.path()).unwrap(), &ctx).unwrap();

    let result = pca(&grid, &PcaParams { n_components: 2 }, &ctx).unwrap();
    assert_eq!(result.components.len(), 2);
    assert!(result.explained_variance_ratio[0] > 0.99);

    let out = dir.path().join("pca_component_1.tif");
    let first = &result.components[0];
    write_geotiff(first, &out, &RasterProfile::for_raster(first)).unwrap();
    let back = read_geotiff(&out).unwrap();
    assert_eq!(back.name(), "pca_component_1");
    assert!(back.nodata().unwrap().is_nan());
    assert_eq!(back.transform(), grid.transform());
}

#[test]
fn empty_directory_is_no_input() {
    let dir = tempfile::tempdir().unwrap();
    let source = RasterSource::from_path(dir.path()).unwrap();
    let err = load_stack(&source).unwrap_err();
    assert!(err.is_validation());
}
