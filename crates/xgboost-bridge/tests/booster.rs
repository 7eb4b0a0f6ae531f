//! Booster training, prediction and introspection against the native library.
//!
//! Built only with `--features native-tests`; the native library must be
//! loadable or every test fails.

#![cfg(feature = "native-tests")]

mod common;

use approx::assert_abs_diff_eq;
use xgboost_bridge::{
    Booster, DMatrix, DumpFormat, FeatureMap, FeatureScore, ImportanceType, Params,
    PredictOptions, PredictType, Prediction, XgbError,
};

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Training and Prediction
// =============================================================================

#[test]
fn concrete_scenario_predicts_finite_values() {
    common::init_native();

    let mut dmat = DMatrix::from_dense(&[1.0, 2.0, 3.0, 4.0], 2, 2, -1.0).unwrap();
    dmat.set_labels(&[0.0, 1.0]).unwrap();
    assert_eq!(dmat.labels().unwrap(), vec![0.0, 1.0]);

    let params = Params::new().with("objective", "binary:logistic");
    let booster = Booster::train(&dmat, &params, 3).unwrap();
    assert_eq!(booster.boosted_rounds().unwrap(), 3);

    let pred = booster.predict(&dmat, &PredictOptions::default()).unwrap();
    let values = pred.as_vector().expect("binary prediction is a vector");
    assert_eq!(values.len(), 2);
    assert!(values.iter().all(|v| v.is_finite()));

    let legacy = booster.predict_flat(&dmat).unwrap();
    assert_eq!(legacy, values.to_vec());
}

#[test]
fn update_advances_one_round_at_a_time() {
    common::init_native();

    let dtrain = common::binary_matrix(100, 3, 11);
    let mut booster = Booster::new(&[&dtrain], &common::binary_params()).unwrap();
    for iteration in 0..4 {
        booster.update(&dtrain, iteration).unwrap();
        assert_eq!(booster.boosted_rounds().unwrap(), iteration as usize + 1);
    }
    assert_eq!(booster.num_features().unwrap(), 3);
}

#[test]
fn applied_params_are_recorded_in_order() {
    common::init_native();

    let dtrain = common::binary_matrix(10, 2, 12);
    let mut booster = Booster::new(&[&dtrain], &common::binary_params()).unwrap();
    booster.set_param("eta", 0.1).unwrap();

    let params = booster.params();
    assert_eq!(params.get_index(0).map(|(k, _)| k.as_str()), Some("objective"));
    assert_eq!(params.get("eta").map(String::as_str), Some("0.1"));
    assert_eq!(params.get("max_depth").map(String::as_str), Some("3"));
}

#[test]
fn leaf_prediction_has_one_column_per_tree() {
    common::init_native();

    let dtrain = common::binary_matrix(80, 3, 13);
    let rounds = 5;
    let booster = Booster::train(&dtrain, &common::binary_params(), rounds).unwrap();

    let opts = PredictOptions::builder().pred_leaf(true).build().unwrap();
    let pred = booster.predict(&dtrain, &opts).unwrap();
    assert_eq!(pred.ndim(), 2);
    assert_eq!(pred.shape(), &[80, rounds as usize]);
}

#[test]
fn contributions_sum_to_probability() {
    common::init_native();

    let dtrain = common::binary_matrix(120, 4, 14);
    let booster = Booster::train(&dtrain, &common::binary_params(), 6).unwrap();

    let probs = booster
        .predict(&dtrain, &PredictOptions::default())
        .unwrap()
        .into_raw_vec();
    let contribs = booster
        .predict(&dtrain, &PredictOptions::of(PredictType::Contributions))
        .unwrap();
    let contribs = contribs.as_matrix().expect("binary contributions are a matrix");
    assert_eq!(contribs.ncols(), 4 + 1);

    for (row, prob) in contribs.rows().into_iter().zip(&probs) {
        assert_abs_diff_eq!(sigmoid(row.sum()), *prob, epsilon = 1e-4);
    }
}

#[test]
fn margin_matches_logit_of_probability() {
    common::init_native();

    let dtrain = common::binary_matrix(50, 2, 15);
    let booster = Booster::train(&dtrain, &common::binary_params(), 4).unwrap();

    let probs = booster.predict(&dtrain, &PredictOptions::default()).unwrap();
    let margins = booster
        .predict(&dtrain, &PredictOptions::of(PredictType::OutputMargin))
        .unwrap();
    for (m, p) in margins.to_flat_vec().iter().zip(probs.to_flat_vec()) {
        assert_abs_diff_eq!(sigmoid(*m), p, epsilon = 1e-5);
    }
}

#[test]
fn interactions_are_rank_three() {
    common::init_native();

    let dtrain = common::binary_matrix(30, 3, 16);
    let booster = Booster::train(&dtrain, &common::binary_params(), 3).unwrap();
    let opts = PredictOptions::builder().pred_interactions(true).build().unwrap();
    let pred = booster.predict(&dtrain, &opts).unwrap();
    assert!(matches!(pred, Prediction::Tensor3(_)));
    assert_eq!(pred.shape(), &[30, 4, 4]);
}

#[test]
fn iteration_range_limits_trees() {
    common::init_native();

    let dtrain = common::binary_matrix(60, 3, 17);
    let booster = Booster::train(&dtrain, &common::binary_params(), 6).unwrap();
    let opts = PredictOptions::builder()
        .pred_leaf(true)
        .iteration_range((0, 2))
        .build()
        .unwrap();
    let pred = booster.predict(&dtrain, &opts).unwrap();
    assert_eq!(pred.shape(), &[60, 2]);
}

#[test]
fn multiclass_shapes_agree_between_paths() {
    common::init_native();

    let (n_rows, n_cols, n_classes) = (90, 3, 3);
    let (features, labels) = common::multiclass_data(n_rows, n_cols, n_classes, 18);
    let mut dtrain = DMatrix::from_dense(&features, n_rows, n_cols, f32::NAN).unwrap();
    dtrain.set_labels(&labels).unwrap();

    let params = Params::new()
        .with("objective", "multi:softprob")
        .with("num_class", n_classes)
        .with("max_depth", 2)
        .with("nthread", 1);
    let booster = Booster::train(&dtrain, &params, 3).unwrap();
    assert_eq!(booster.num_class(), n_classes);

    let shaped = booster.predict(&dtrain, &PredictOptions::default()).unwrap();
    let shaped = shaped.as_matrix().expect("softprob output is a matrix").clone();
    assert_eq!(shaped.dim(), (n_rows, n_classes));
    for row in shaped.rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
    }

    let legacy = booster.predict_flat_by_class(&dtrain).unwrap();
    assert_eq!(legacy, shaped);

    // Per-class contributions gain a class axis.
    let contribs = booster
        .predict(&dtrain, &PredictOptions::of(PredictType::Contributions))
        .unwrap();
    assert_eq!(contribs.shape(), &[n_rows, n_classes, n_cols + 1]);

    // Interactions add a second feature axis.
    let opts = PredictOptions::builder().pred_interactions(true).build().unwrap();
    let interactions = booster.predict(&dtrain, &opts).unwrap();
    assert!(matches!(interactions, Prediction::Tensor4(_)));
    assert_eq!(interactions.shape(), &[n_rows, n_classes, n_cols + 1, n_cols + 1]);
}

// =============================================================================
// Introspection
// =============================================================================

#[test]
fn feature_scores_cover_used_features() {
    common::init_native();

    let dtrain = common::binary_matrix(200, 3, 19);
    let booster = Booster::train(&dtrain, &common::binary_params(), 5).unwrap();

    let scores = booster.feature_score(ImportanceType::Weight).unwrap();
    assert!(!scores.is_empty());
    for (name, score) in scores.iter() {
        assert!(["f0", "f1", "f2"].contains(&name), "unexpected feature {name}");
        assert!(matches!(score, FeatureScore::Scalar(v) if *v >= 1.0));
    }
    assert!(scores.get("f0").is_some());

    let gains = booster.feature_score(ImportanceType::TotalGain).unwrap();
    assert_eq!(gains.len(), scores.len());
}

#[test]
fn text_dump_has_one_labelled_entry_per_tree() {
    common::init_native();

    let dtrain = common::binary_matrix(100, 2, 20);
    let booster = Booster::train(&dtrain, &common::binary_params(), 4).unwrap();

    let dumps = booster.dump_model(None, true).unwrap();
    assert_eq!(dumps.len(), 4);
    for (i, tree) in dumps.iter().enumerate() {
        assert!(tree.starts_with(&format!("booster[{i}]\n")));
        assert!(tree.contains("leaf="));
        assert!(tree.contains("gain="));
    }
}

#[test]
fn feature_map_names_appear_in_dump() {
    common::init_native();

    let dtrain = common::binary_matrix(200, 2, 21);
    let booster = Booster::train(&dtrain, &common::binary_params(), 3).unwrap();
    let fmap = FeatureMap::from_names(&["left_col", "right_col"]);

    let dumps = booster.dump_model(Some(&fmap), false).unwrap();
    let text = dumps.concat();
    assert!(text.contains("left_col") || text.contains("right_col"));
    assert!(!text.contains("[f0<"));
}

#[test]
fn fmap_file_names_appear_in_dump() {
    common::init_native();

    let dtrain = common::binary_matrix(200, 2, 21);
    let booster = Booster::train(&dtrain, &common::binary_params(), 3).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.fmap");
    FeatureMap::from_names(&["left_col", "right_col"])
        .write_to(std::fs::File::create(&path).unwrap())
        .unwrap();

    let dumps = booster
        .dump_model_with_fmap_file(&path, false, DumpFormat::Text)
        .unwrap();
    assert_eq!(dumps.len(), 3);
    assert!(dumps[0].starts_with("booster[0]\n"));
    let text = dumps.concat();
    assert!(text.contains("left_col") || text.contains("right_col"));
    assert!(!text.contains("[f0<"));

    let missing = booster.dump_model_with_fmap_file(dir.path().join("absent.fmap"), false, DumpFormat::Text);
    assert!(matches!(missing, Err(XgbError::InvalidArgument(_))));
}

#[test]
fn json_dump_entries_parse() {
    common::init_native();

    let dtrain = common::binary_matrix(50, 2, 22);
    let booster = Booster::train(&dtrain, &common::binary_params(), 2).unwrap();
    let dumps = booster.dump_model_ex(None, false, DumpFormat::Json).unwrap();
    assert_eq!(dumps.len(), 2);
    for tree in dumps {
        let parsed: serde_json::Value = serde_json::from_str(&tree).unwrap();
        assert!(parsed.get("nodeid").is_some());
    }
}

#[test]
fn native_config_is_json() {
    common::init_native();

    let dtrain = common::binary_matrix(20, 2, 23);
    let booster = Booster::train(&dtrain, &common::binary_params(), 1).unwrap();
    let config: serde_json::Value = serde_json::from_str(&booster.save_config().unwrap()).unwrap();
    assert!(config.pointer("/learner/objective").is_some());
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn native_failure_carries_message() {
    common::init_native();

    let err = Booster::load("/definitely/missing/model.json").unwrap_err();
    match err {
        XgbError::NativeCall { message } => assert!(!message.is_empty()),
        other => panic!("expected NativeCall, got {other:?}"),
    }
}

#[test]
fn invalid_num_class_rejected_before_creation() {
    common::init_native();

    let dtrain = common::binary_matrix(10, 2, 24);
    let params = Params::new().with("num_class", -2);
    assert!(matches!(
        Booster::new(&[&dtrain], &params),
        Err(XgbError::Configuration(_))
    ));
}

#[test]
fn zero_num_class_means_single_output() {
    common::init_native();

    let dtrain = common::binary_matrix(60, 2, 26);
    let params = common::binary_params().with("num_class", 0);
    let booster = Booster::train(&dtrain, &params, 2).unwrap();
    assert_eq!(booster.num_class(), 1);
    assert_eq!(booster.predict_flat_by_class(&dtrain).unwrap().dim(), (60, 1));
}

#[test]
fn unsupported_save_extension_rejected() {
    common::init_native();

    let dir = tempfile::tempdir().unwrap();
    let dtrain = common::binary_matrix(10, 2, 25);
    let booster = Booster::train(&dtrain, &common::binary_params(), 1).unwrap();

    let path = dir.path().join("model.bin");
    assert!(matches!(booster.save(&path), Err(XgbError::Configuration(_))));
    assert!(!path.exists());
}

#[test]
fn freed_booster_reports_disposed() {
    common::init_native();

    let dtrain = common::binary_matrix(10, 2, 26);
    let mut booster = Booster::train(&dtrain, &common::binary_params(), 1).unwrap();
    booster.free().unwrap();
    assert!(booster.is_freed());
    assert!(matches!(
        booster.predict(&dtrain, &PredictOptions::default()),
        Err(XgbError::Disposed("Booster"))
    ));
    assert!(matches!(booster.boosted_rounds(), Err(XgbError::Disposed(_))));
}

#[test]
fn freed_matrix_rejected_by_booster() {
    common::init_native();

    let dtrain = common::binary_matrix(10, 2, 27);
    let booster = Booster::train(&dtrain, &common::binary_params(), 1).unwrap();
    let mut dtest = common::binary_matrix(5, 2, 28);
    dtest.free().unwrap();
    assert!(matches!(
        booster.predict(&dtest, &PredictOptions::default()),
        Err(XgbError::Disposed("DMatrix"))
    ));
}
