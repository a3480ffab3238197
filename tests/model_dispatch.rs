//! Every model family fits through the same dispatch; bad names never reach it

use epf_workbench::config::{ConfigError, PipelineConfig};
use epf_workbench::ml::models::{
    AdaBoostParams, BoostedTreesParams, ElasticNetParams, GradientBoostParams, KnnParams,
    LassoParams, NeuralNetParams, SvrParams,
};
use epf_workbench::ml::{ModelSpec, OutputCapability};
use ndarray::Array2;
use rstest::rstest;

/// 60 rows, 3 features, 4 smooth targets
fn training_data() -> (Array2<f64>, Array2<f64>) {
    let x = Array2::from_shape_fn((60, 3), |(i, j)| ((i * (j + 1)) as f64 * 0.07).sin());
    let y = Array2::from_shape_fn((60, 4), |(i, h)| {
        0.5 * x[[i, 0]] - 0.3 * x[[i, 1]] + 0.1 * h as f64
    });
    (x, y)
}

#[rstest]
#[case("zscore", "knn", ConfigError::UnknownScaler("zscore".into()))]
#[case("minmax", "randomforest", ConfigError::UnknownModel("randomforest".into()))]
fn unknown_names_rejected_before_fitting(
    #[case] scaler: &str,
    #[case] model: &str,
    #[case] expected: ConfigError,
) {
    assert_eq!(PipelineConfig::from_names(scaler, model).unwrap_err(), expected);
}

#[rstest]
#[case::neural_net(ModelSpec::NeuralNet(NeuralNetParams {
    hidden_layers: 3,
    width: 8,
    max_epochs: 15,
    patience: 5,
    ..Default::default()
}))]
#[case::knn(ModelSpec::Knn(KnnParams::default()))]
#[case::lasso(ModelSpec::Lasso(LassoParams::default()))]
#[case::elastic_net(ModelSpec::ElasticNet(ElasticNetParams::default()))]
#[case::svr(ModelSpec::Svr(SvrParams::default()))]
#[case::ada_boost(ModelSpec::AdaBoost(AdaBoostParams {
    n_estimators: 10,
    ..Default::default()
}))]
#[case::gradient_boost(ModelSpec::GradientBoost(GradientBoostParams {
    n_estimators: 20,
    ..Default::default()
}))]
#[case::boosted_trees(ModelSpec::BoostedTrees(BoostedTreesParams {
    n_estimators: 20,
    min_child_samples: 5,
    ..Default::default()
}))]
fn every_family_predicts_all_targets(#[case] spec: ModelSpec) {
    let (x, y) = training_data();
    let model = spec.fit(&x, &y, 7).unwrap();
    assert_eq!(model.name, spec.name());

    let pred = model.predict(&x).unwrap();
    assert_eq!(pred.dim(), y.dim());
    assert!(pred.iter().all(|v| v.is_finite()));
    assert_eq!(model.history.is_some(), matches!(spec, ModelSpec::NeuralNet(_)));
}

#[rstest]
#[case("svr", OutputCapability::SingleOutput)]
#[case("adaboost", OutputCapability::SingleOutput)]
#[case("lightgbm", OutputCapability::SingleOutput)]
#[case("nn", OutputCapability::NativeMultiOutput)]
#[case("elastic", OutputCapability::NativeMultiOutput)]
fn capability_by_family(#[case] name: &str, #[case] expected: OutputCapability) {
    assert_eq!(name.parse::<ModelSpec>().unwrap().capability(), expected);
}

#[test]
fn prediction_width_is_checked() {
    let (x, y) = training_data();
    let model = ModelSpec::Knn(KnnParams::default()).fit(&x, &y, 0).unwrap();
    let narrow = Array2::<f64>::zeros((2, 2));
    assert!(model.predict(&narrow).is_err());
}
