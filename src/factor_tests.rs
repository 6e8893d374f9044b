use crate::diagnostics::check_consistency;
use crate::error::FactorError;
use crate::factor::{projection_weights, run_factor_analysis, FactorAnalysis, FactorConfig};
use crate::linalg_backends::NdarrayLinAlgBackend;
use crate::varimax::VarimaxConfig;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Six variables driven by two latent factors: columns 0-2 follow the first,
/// columns 3-5 the second. Within-block correlation is about 0.8, so the
/// population spectrum is roughly [2.6, 2.6, 0.2, 0.2, 0.2, 0.2].
fn two_block_data(n_samples: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut data = Array2::<f64>::zeros((n_samples, 6));
    for i in 0..n_samples {
        let f1 = normal.sample(&mut rng);
        let f2 = normal.sample(&mut rng);
        for j in 0..3 {
            data[[i, j]] = j as f64 + f1 + 0.5 * normal.sample(&mut rng);
        }
        for j in 3..6 {
            data[[i, j]] = 10.0 + 2.0 * (f2 + 0.5 * normal.sample(&mut rng));
        }
    }
    data
}

fn score_covariance(scores: &Array2<f64>) -> Array2<f64> {
    scores.t().dot(scores) / scores.nrows() as f64
}

#[cfg(test)]
mod unrotated_tests {
    use super::*;

    #[test]
    fn squared_loadings_sum_to_eigenvalues() {
        let data = two_block_data(300, 1);
        for config in [FactorConfig::default(), FactorConfig::default().with_reduction(1.0)] {
            let result = run_factor_analysis(data.view(), &config).unwrap();
            let column_ss = result.component_matrix().mapv(|x| x * x).sum_axis(Axis(0));
            assert_abs_diff_eq!(column_ss, result.eigenvalues().clone(), epsilon = 1e-10);
            assert_abs_diff_eq!(
                result.sum_sq_loadings().clone(),
                result.eigenvalues().clone(),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn full_solution_has_unit_communalities() {
        let data = two_block_data(200, 2);
        let result = run_factor_analysis(data.view(), &FactorConfig::default()).unwrap();
        assert_eq!(result.n_factors(), 6);
        assert_abs_diff_eq!(
            result.communalities().clone(),
            ndarray::Array1::<f64>::ones(6),
            epsilon = 1e-10
        );
    }

    #[test]
    fn full_spectrum_is_descending_and_sums_to_k() {
        let data = two_block_data(250, 3);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let all = result.eigenvalues_all();
        assert_eq!(all.len(), 6);
        assert_abs_diff_eq!(all.sum(), 6.0, epsilon = 1e-10);
        for pair in all.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert_abs_diff_eq!(
            result.eigenvalues().clone(),
            all.slice(ndarray::s![..result.n_factors()]).to_owned(),
            epsilon = 0.0
        );
    }

    #[test]
    fn kaiser_keeps_eigenvalues_above_one() {
        let data = two_block_data(300, 4);
        let result = run_factor_analysis(data.view(), &FactorConfig::default().with_reduction(1.0)).unwrap();
        let expected = result.eigenvalues_all().iter().filter(|&&v| v > 1.0).count();
        assert_eq!(result.n_factors(), expected);
        assert_eq!(result.n_factors(), 2);
        assert_eq!(result.component_matrix().dim(), (6, 2));
        assert_eq!(result.weights().dim(), (6, 2));
        assert_eq!(result.scores().dim(), (300, 2));
    }

    #[test]
    fn threshold_equal_to_an_eigenvalue_drops_it() {
        let data = two_block_data(300, 4);
        let full = run_factor_analysis(data.view(), &FactorConfig::default()).unwrap();
        let second = full.eigenvalues_all()[1];
        let reduced = run_factor_analysis(data.view(), &FactorConfig::default().with_reduction(second)).unwrap();
        assert_eq!(reduced.n_factors(), 1);
        assert_eq!(reduced.eigenvalues()[0], full.eigenvalues_all()[0]);
    }

    #[test]
    fn factors_are_reflected() {
        let data = two_block_data(300, 5);
        let result = run_factor_analysis(data.view(), &FactorConfig::default()).unwrap();
        for column_sum in result.component_matrix().sum_axis(Axis(0)).iter() {
            assert!(*column_sum >= 0.0, "column sum {} is negative", column_sum);
        }
    }

    #[test]
    fn scores_are_z_times_weights() {
        let data = two_block_data(150, 6);
        let result = run_factor_analysis(data.view(), &FactorConfig::default().with_reduction(1.0)).unwrap();
        assert_eq!(result.scores(), &result.z_inputs().dot(result.weights()));
        let expected_weights = result.component_matrix() / result.eigenvalues();
        assert_abs_diff_eq!(result.weights().clone(), expected_weights, epsilon = 1e-14);
    }

    #[test]
    fn scores_are_uncorrelated_with_unit_variance() {
        let data = two_block_data(400, 7);
        let result = run_factor_analysis(data.view(), &FactorConfig::default()).unwrap();
        let cov = score_covariance(result.scores());
        assert_abs_diff_eq!(cov, Array2::<f64>::eye(6), epsilon = 1e-8);
    }

    #[test]
    fn whitening_and_weight_scores_agree() {
        let data = two_block_data(300, 8);
        let result = run_factor_analysis(data.view(), &FactorConfig::default().with_reduction(1.0)).unwrap();
        let report = check_consistency(&result).unwrap();
        assert!(report.score_equivalence_error < 1e-8, "{:?}", report);
        assert!(report.is_consistent(1e-8), "{:?}", report);
        assert!(report.rotated_score_error.is_none());
    }

    #[test]
    fn unrotated_run_has_no_rotated_solution() {
        let data = two_block_data(100, 9);
        let result = run_factor_analysis(data.view(), &FactorConfig::default()).unwrap();
        assert!(result.rotated().is_none());
        assert_eq!(result.index_scores(), result.scores());
        assert_eq!(result.index_weights(), result.weights());
    }

    #[test]
    fn variance_explained_matches_eigenvalues() {
        let data = two_block_data(200, 10);
        let result = run_factor_analysis(data.view(), &FactorConfig::default()).unwrap();
        assert_abs_diff_eq!(result.variance_explained().sum(), 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(
            result.variance_explained()[0],
            result.eigenvalues()[0] / 6.0,
            epsilon = 1e-12
        );
    }
}

#[cfg(test)]
mod rotated_tests {
    use super::*;

    #[test]
    fn rotation_preserves_total_communality() {
        let data = two_block_data(300, 11);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let rotated = result.rotated().unwrap();
        let rotated_total = rotated.component_matrix().mapv(|x| x * x).sum();
        assert_abs_diff_eq!(rotated_total, result.communalities().sum(), epsilon = 1e-10);
        assert_abs_diff_eq!(
            rotated.sum_sq_loadings().sum(),
            result.eigenvalues().sum(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn rotated_factors_are_ordered_and_reflected() {
        let data = two_block_data(300, 12);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let rotated = result.rotated().unwrap();
        let column_ss = rotated.component_matrix().mapv(|x| x * x).sum_axis(Axis(0));
        assert_abs_diff_eq!(column_ss, rotated.sum_sq_loadings().clone(), epsilon = 1e-12);
        for pair in rotated.sum_sq_loadings().windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        for column_sum in rotated.component_matrix().sum_axis(Axis(0)).iter() {
            assert!(*column_sum >= 0.0);
        }
    }

    #[test]
    fn varimax_recovers_the_two_blocks() {
        let data = two_block_data(500, 13);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let loadings = result.rotated().unwrap().component_matrix();
        let dominant: Vec<usize> = loadings
            .rows()
            .into_iter()
            .map(|row| {
                let (factor, value) = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
                    .unwrap();
                assert!(value.abs() > 0.8, "weak dominant loading {}", value);
                factor
            })
            .collect();
        assert_eq!(dominant[0], dominant[1]);
        assert_eq!(dominant[1], dominant[2]);
        assert_eq!(dominant[3], dominant[4]);
        assert_eq!(dominant[4], dominant[5]);
        assert_ne!(dominant[0], dominant[3]);
    }

    #[test]
    fn rotated_weights_invert_rotated_loadings() {
        let data = two_block_data(300, 14);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let rotated = result.rotated().unwrap();
        let product = rotated.weights().t().dot(rotated.component_matrix());
        assert_abs_diff_eq!(product, Array2::<f64>::eye(2), epsilon = 1e-10);
        assert_eq!(rotated.scores(), &result.z_inputs().dot(rotated.weights()));
    }

    #[test]
    fn rotated_scores_are_uncorrelated_with_unit_variance() {
        let data = two_block_data(400, 15);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let cov = score_covariance(result.rotated().unwrap().scores());
        assert_abs_diff_eq!(cov, Array2::<f64>::eye(2), epsilon = 1e-8);
    }

    #[test]
    fn rotated_solution_passes_all_checks() {
        let data = two_block_data(300, 16);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let rotated = result.rotated().unwrap();
        assert!(rotated.convergence().converged);
        assert!(rotated.convergence().iterations <= 100);
        let report = check_consistency(&result).unwrap();
        assert!(report.is_consistent(1e-8), "{:?}", report);
        assert!(report.min_factor_sum >= 0.0);
    }

    #[test]
    fn iteration_cap_still_returns_a_solution() {
        let data = two_block_data(300, 17);
        let config = FactorConfig::sovi().with_rotation(VarimaxConfig {
            max_iterations: 1,
            ..VarimaxConfig::default()
        });
        let result = run_factor_analysis(data.view(), &config).unwrap();
        let rotated = result.rotated().unwrap();
        assert!(!rotated.convergence().converged);
        assert_eq!(rotated.convergence().iterations, 1);
        assert_eq!(rotated.scores().dim(), (300, 2));
    }

    #[test]
    fn index_uses_rotated_scores() {
        let data = two_block_data(120, 18);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let rotated = result.rotated().unwrap();
        assert_eq!(result.index_scores(), rotated.scores());
        assert_eq!(result.index_weights(), rotated.weights());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let data = two_block_data(300, 19);
        let engine = FactorAnalysis::new(FactorConfig::sovi());
        let first = engine.run(data.view()).unwrap();
        let second = engine.run(data.view()).unwrap();
        assert_abs_diff_eq!(first.scores().clone(), second.scores().clone(), epsilon = 1e-12);
        assert_abs_diff_eq!(
            first.rotated().unwrap().scores().clone(),
            second.rotated().unwrap().scores().clone(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            first.rotated().unwrap().weights().clone(),
            second.rotated().unwrap().weights().clone(),
            epsilon = 1e-12
        );
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[test]
    fn unreachable_threshold_keeps_nothing() {
        let data = two_block_data(100, 20);
        let err = run_factor_analysis(data.view(), &FactorConfig::default().with_reduction(100.0)).unwrap_err();
        match err {
            FactorError::NoRetainedFactors { min_eigenvalue, largest } => {
                assert_eq!(min_eigenvalue, 100.0);
                assert!(largest > 1.0 && largest < 6.0);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let data = two_block_data(100, 21);
        let err = run_factor_analysis(data.view(), &FactorConfig::default().with_reduction(f64::NAN)).unwrap_err();
        assert!(matches!(err, FactorError::InvalidConfig(_)));
    }

    #[test]
    fn threshold_is_ignored_without_reduction() {
        let data = two_block_data(100, 22);
        let config = FactorConfig {
            min_eigenvalue: f64::NAN,
            ..FactorConfig::default()
        };
        let result = run_factor_analysis(data.view(), &config).unwrap();
        assert_eq!(result.n_factors(), 6);
    }

    #[test]
    fn collinear_columns_are_singular_without_reduction() {
        let mut data = two_block_data(100, 23);
        let doubled = data.column(0).mapv(|x| 2.0 * x + 1.0);
        data.column_mut(1).assign(&doubled);
        let err = run_factor_analysis(data.view(), &FactorConfig::default()).unwrap_err();
        assert!(matches!(err, FactorError::SingularCorrelation { .. }), "{:?}", err);
    }

    #[test]
    fn rank_deficient_loadings_are_reported() {
        let loadings = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let err = projection_weights(&NdarrayLinAlgBackend, loadings.view()).unwrap_err();
        assert!(matches!(err, FactorError::RankDeficient { .. }));
    }

    #[test]
    fn projection_weights_of_full_rank_loadings() {
        let loadings = array![[0.9, 0.1], [0.8, 0.2], [0.1, 0.7], [0.2, 0.9]];
        let weights = projection_weights(&NdarrayLinAlgBackend, loadings.view()).unwrap();
        let product = weights.t().dot(&loadings);
        assert_abs_diff_eq!(product, Array2::<f64>::eye(2), epsilon = 1e-12);
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn defaults_follow_spss() {
        let config = FactorConfig::default();
        assert!(!config.reduce);
        assert_eq!(config.min_eigenvalue, 1.0);
        assert!(!config.varimax);
        assert_eq!(config.rotation.max_iterations, 100);
        assert_eq!(config.rotation.tolerance, 1e-6);

        let sovi = FactorConfig::sovi();
        assert!(sovi.reduce && sovi.varimax);
        assert_eq!(FactorAnalysis::new(sovi.clone()).config(), &sovi);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = FactorConfig::sovi().with_rotation(VarimaxConfig {
            max_iterations: 250,
            tolerance: 1e-8,
        });
        let json = serde_json::to_string(&config).unwrap();
        let parsed: FactorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: FactorConfig = serde_json::from_str(r#"{"reduce": true, "varimax": true}"#).unwrap();
        assert_eq!(parsed, FactorConfig::sovi());
    }

    #[test]
    fn results_serialize() {
        let data = two_block_data(50, 24);
        let result = run_factor_analysis(data.view(), &FactorConfig::sovi()).unwrap();
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("component_matrix").is_some());
        assert!(value.get("rotated").unwrap().get("convergence").is_some());
    }
}
