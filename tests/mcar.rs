use mixreview::mcar::{McarOutcome, em_estimate, little_mcar};

/// Small deterministic generator so the fixtures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn complete_rows(n: usize) -> Vec<Vec<f64>> {
    let mut rng = Lcg(42);
    (0..n)
        .map(|_| {
            let x1 = 10.0 * rng.next();
            let x2 = 0.5 * x1 + 5.0 * rng.next();
            let x3 = 0.3 * x2 + 3.0 * rng.next();
            vec![x1, x2, x3]
        })
        .collect()
}

fn with_missing(rows: &[Vec<f64>]) -> Vec<Vec<Option<f64>>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut out: Vec<Option<f64>> = row.iter().copied().map(Some).collect();
            if i % 4 == 0 {
                out[2] = None;
            }
            if i % 5 == 1 {
                out[1] = None;
            }
            out
        })
        .collect()
}

#[test]
fn em_on_complete_data_recovers_sample_moments() {
    let rows = complete_rows(50);
    let input: Vec<Vec<Option<f64>>> = rows
        .iter()
        .map(|r| r.iter().copied().map(Some).collect())
        .collect();
    let (mu, sigma, _) = em_estimate(&input, 500, 1e-9).expect("em");
    for j in 0..3 {
        let mean = rows.iter().map(|r| r[j]).sum::<f64>() / 50.0;
        assert!((mu[j] - mean).abs() < 1e-9);
    }
    let m0 = mu[0];
    let m1 = mu[1];
    let cov01 = rows.iter().map(|r| (r[0] - m0) * (r[1] - m1)).sum::<f64>() / 50.0;
    assert!((sigma[[0, 1]] - cov01).abs() < 1e-9);
    assert!((sigma[[0, 1]] - sigma[[1, 0]]).abs() < 1e-12);
}

#[test]
fn little_test_runs_on_incomplete_data() {
    let rows = with_missing(&complete_rows(60));
    match little_mcar(&rows) {
        McarOutcome::Ran(test) => {
            // Patterns: complete, x3 missing, x2 missing, both missing.
            assert_eq!(test.patterns, 4);
            assert_eq!(test.df, 3.0 + 2.0 + 2.0 + 1.0 - 3.0);
            assert_eq!(test.cases, 60);
            assert!(test.statistic.is_finite() && test.statistic >= 0.0);
            assert!((0.0..=1.0).contains(&test.p));
        }
        McarOutcome::DidNotRun(reason) => panic!("test did not run: {reason}"),
    }
}

#[test]
fn rows_without_any_indicator_are_excluded() {
    let mut rows = with_missing(&complete_rows(60));
    rows.push(vec![None, None, None]);
    rows.push(vec![None, None, None]);
    match little_mcar(&rows) {
        McarOutcome::Ran(test) => assert_eq!(test.cases, 60),
        McarOutcome::DidNotRun(reason) => panic!("test did not run: {reason}"),
    }
}

#[test]
fn single_pattern_does_not_run() {
    let rows: Vec<Vec<Option<f64>>> = complete_rows(30)
        .iter()
        .map(|r| r.iter().copied().map(Some).collect())
        .collect();
    let outcome = little_mcar(&rows);
    assert!(matches!(outcome, McarOutcome::DidNotRun(_)));
    assert!(outcome.interpretation().starts_with("test did not run"));
}

#[test]
fn collinear_indicators_do_not_run() {
    let rows: Vec<Vec<Option<f64>>> = complete_rows(40)
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let x3 = if i % 3 == 0 { None } else { Some(2.0 * r[0]) };
            vec![Some(r[0]), Some(2.0 * r[0]), x3]
        })
        .collect();
    assert!(matches!(little_mcar(&rows), McarOutcome::DidNotRun(_)));
}

#[test]
fn constant_indicator_does_not_run() {
    let rows: Vec<Vec<Option<f64>>> = (0..20)
        .map(|i| {
            let x2 = if i % 2 == 0 { None } else { Some(1.0) };
            vec![Some(i as f64), x2]
        })
        .collect();
    assert!(matches!(little_mcar(&rows), McarOutcome::DidNotRun(_)));
}
