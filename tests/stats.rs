use mixreview::error::ReviewError;
use mixreview::stats::{
    chi_square_independence, chisq_difference, cohens_d, holm_adjust, one_way_anova,
    scaled_lrt_difference, significance_tier, summarize, welch_t_test,
};

fn approx(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}

#[test]
fn welch_t_test_unequal_variances() {
    let a = [1.0, 2.0, 3.0, 4.0, 5.0];
    let b = [2.0, 4.0, 6.0, 8.0, 10.0];
    let test = welch_t_test(&a, &b).expect("welch");
    assert!(approx(test.mean_difference, -3.0, 1e-12));
    assert!(approx(test.t, -1.897_366_596_101_027_5, 1e-9));
    assert!(approx(test.df, 5.882_352_941_176_471, 1e-9));
    assert!(approx(test.p, 0.107_531, 1e-4));
}

#[test]
fn welch_t_test_degenerate_inputs() {
    let err = welch_t_test(&[1.0, 1.0, 1.0], &[2.0, 2.0, 2.0]).expect_err("zero variance");
    assert!(matches!(err, ReviewError::Degenerate(_)));
    let err = welch_t_test(&[1.0], &[2.0, 3.0]).expect_err("single observation");
    assert!(matches!(err, ReviewError::Degenerate(_)));
}

#[test]
fn cohens_d_uses_pooled_sd() {
    let a = [1.0, 2.0, 3.0, 4.0, 5.0];
    let b = [2.0, 4.0, 6.0, 8.0, 10.0];
    assert!(approx(cohens_d(&a, &b), -1.2, 1e-12));
    assert!(cohens_d(&[1.0], &b).is_nan());
}

#[test]
fn summary_of_sample() {
    let s = summarize(&[2.0, 4.0, 6.0, 8.0]);
    assert_eq!(s.n, 4);
    assert!(approx(s.mean, 5.0, 1e-12));
    assert!(approx(s.sd, (20.0_f64 / 3.0).sqrt(), 1e-12));
    assert!(approx(s.se, s.sd / 2.0, 1e-12));
    assert!(summarize(&[]).mean.is_nan());
}

#[test]
fn anova_with_eta_squared() {
    let groups = vec![
        vec![1.0, 2.0, 3.0],
        vec![4.0, 5.0, 6.0],
        vec![7.0, 8.0, 9.0],
    ];
    let a = one_way_anova(&groups).expect("anova");
    assert!(approx(a.f, 12.0, 1e-9));
    assert_eq!(a.df_between, 2.0);
    assert_eq!(a.df_within, 6.0);
    // F(2, 6) upper tail is (1 + 2F/6)^-3.
    assert!(approx(a.p, 0.008, 1e-7));
    assert!(approx(a.eta_squared, 0.8, 1e-12));

    let err = one_way_anova(&[vec![1.0, 2.0]]).expect_err("one group");
    assert!(matches!(err, ReviewError::Degenerate(_)));
}

#[test]
fn chi_square_two_by_two() {
    let t = chi_square_independence(&[vec![10.0, 20.0], vec![30.0, 40.0]]).expect("chi-square");
    assert!(approx(t.chi_square, 0.793_650_793_650_793_6, 1e-9));
    assert_eq!(t.df, 1.0);
    assert!(approx(t.p, 0.372_998_483_613_487, 1e-6));
    assert!(approx(t.cramers_v, 0.089_087_080_637_474_8, 1e-9));
    assert_eq!(t.sparse_fraction, 0.0);
}

#[test]
fn chi_square_drops_empty_margins() {
    let t = chi_square_independence(&[
        vec![10.0, 20.0, 0.0],
        vec![30.0, 40.0, 0.0],
        vec![0.0, 0.0, 0.0],
    ])
    .expect("chi-square");
    assert_eq!(t.df, 1.0);

    let err = chi_square_independence(&[vec![5.0, 5.0], vec![0.0, 0.0]]).expect_err("one row");
    assert!(matches!(err, ReviewError::Degenerate(_)));
}

#[test]
fn chi_square_difference_between_nested_models() {
    let d = chisq_difference(100.0, 40, 110.0, 38);
    assert_eq!(d.delta_chi_square, 10.0);
    assert_eq!(d.delta_df, 2.0);
    assert!(approx(d.p.expect("p"), (-5.0_f64).exp(), 1e-9));

    let d = chisq_difference(100.0, 38, 90.0, 40);
    assert_eq!(d.delta_df, -2.0);
    assert!(d.p.is_none());
}

#[test]
fn scaled_difference() {
    let s = scaled_lrt_difference((-1010.0, 38, 1.1), (-1000.0, 40, 1.2)).expect("scaled");
    assert!(approx(s.scaling, 3.1, 1e-12));
    assert!(approx(s.statistic, 20.0 / 3.1, 1e-9));
    assert_eq!(s.df, 2.0);
    assert!(approx(s.p, (-10.0_f64 / 3.1).exp(), 1e-9));

    let err = scaled_lrt_difference((-1010.0, 38, 1.2), (-1000.0, 40, 1.1))
        .expect_err("negative correction");
    assert!(matches!(err, ReviewError::Degenerate(_)));
}

#[test]
fn holm_adjustment_values() {
    let adjusted = holm_adjust(&[0.01, 0.04, 0.03, f64::NAN, 0.5]);
    assert!(approx(adjusted[0], 0.04, 1e-12));
    assert!(approx(adjusted[1], 0.09, 1e-12));
    assert!(approx(adjusted[2], 0.09, 1e-12));
    assert!(adjusted[3].is_nan());
    assert!(approx(adjusted[4], 0.5, 1e-12));
}

#[test]
fn holm_adjustment_bounds() {
    let sets: [&[f64]; 4] = [
        &[0.9, 0.8],
        &[0.001, 0.2, 0.04, 0.04, 0.7, 0.0],
        &[1.0],
        &[0.3, 0.01, 0.049, 0.02, 0.6, 0.011, 0.25],
    ];
    for raw in sets {
        let adjusted = holm_adjust(raw);
        assert_eq!(adjusted.len(), raw.len());
        for (p, q) in raw.iter().zip(&adjusted) {
            assert!(q >= p, "adjusted {q} below raw {p}");
            assert!(*q <= 1.0);
        }
    }
    assert_eq!(holm_adjust(&[0.9, 0.8]), vec![1.0, 1.0]);
    assert!(holm_adjust(&[]).is_empty());
}

#[test]
fn significance_tiers() {
    assert_eq!(significance_tier(0.0004), "***");
    assert_eq!(significance_tier(0.004), "**");
    assert_eq!(significance_tier(0.04), "*");
    assert_eq!(significance_tier(0.05), "ns");
    assert_eq!(significance_tier(f64::NAN), "n/a");
}
