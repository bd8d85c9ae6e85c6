use std::fs;
use std::path::Path;

use mixreview::layout::StudyLayout;
use mixreview::missing::{
    AttritionPattern, MissingConfig, attrition_summary, classify_attrition, missing_data,
};

fn all_patterns(waves: usize) -> Vec<Vec<bool>> {
    (0..1u32 << waves)
        .map(|bits| (0..waves).map(|w| bits & (1 << w) != 0).collect())
        .collect()
}

fn absent_then_present(presence: &[bool]) -> bool {
    (0..presence.len()).any(|i| !presence[i] && presence[i + 1..].iter().any(|p| *p))
}

#[test]
fn classification_examples() {
    use AttritionPattern::*;
    assert_eq!(classify_attrition(&[true; 6]), Complete);
    assert_eq!(
        classify_attrition(&[true, true, true, false, false, false]),
        Monotone
    );
    assert_eq!(classify_attrition(&[false; 6]), Monotone);
    assert_eq!(
        classify_attrition(&[true, false, true, true, true, true]),
        Intermittent
    );
    // Late entry counts as intermittent.
    assert_eq!(
        classify_attrition(&[false, true, true, true, true, true]),
        Intermittent
    );
    assert_eq!(classify_attrition(&[true, false]), Monotone);
    assert_eq!(classify_attrition(&[false, true]), Intermittent);
}

#[test]
fn classification_properties_over_every_six_wave_pattern() {
    let patterns = all_patterns(6);
    for presence in &patterns {
        match classify_attrition(presence) {
            AttritionPattern::Complete => assert!(presence.iter().all(|p| *p)),
            AttritionPattern::Monotone => {
                assert!(!absent_then_present(presence), "{presence:?}");
                assert!(presence.iter().any(|p| !*p));
            }
            AttritionPattern::Intermittent => assert!(absent_then_present(presence), "{presence:?}"),
        }
    }

    let summary = attrition_summary(&patterns, 6);
    assert_eq!(summary.total, 64);
    assert_eq!(summary.waves_completed.iter().sum::<usize>(), 64);
    assert_eq!(summary.waves_completed, vec![1, 6, 15, 20, 15, 6, 1]);
    assert_eq!(summary.complete, 1);
    // Monotone patterns are a present prefix of length 0..=5.
    assert_eq!(summary.monotone, 6);
    assert_eq!(summary.intermittent, 57);
    assert_eq!(summary.complete + summary.monotone + summary.intermittent, 64);
}

#[test]
fn percentages_not_available_when_everyone_is_complete() {
    let summary = attrition_summary(&vec![vec![true; 6]; 5], 6);
    assert_eq!(summary.monotone_percent(), None);
    assert_eq!(summary.intermittent_percent(), None);
    assert_eq!(summary.waves_completed[6], 5);
}

fn subject_line(id: usize, complete: bool) -> String {
    let mut tokens = vec![
        id.to_string(),
        "1".to_string(),
        (id % 4 + 1).to_string(),
        "1.25".to_string(),
        (id % 2).to_string(),
        (id % 3 + 1).to_string(),
        format!("{}", 12.0 + (id % 5) as f64 * 0.2),
        (id % 6 + 10).to_string(),
        format!("{}", 20.0 + (id * 7 % 11) as f64),
        ((id / 2) % 2).to_string(),
    ];
    for wave in 1..=6 {
        for item in 1..=3 {
            if complete || wave <= 3 {
                tokens.push(format!("{}", ((id + wave * item) % 4) as f64));
            } else if item == 2 {
                tokens.push(".".to_string());
            } else {
                tokens.push("-999".to_string());
            }
        }
    }
    tokens.push(format!("{}", 5.0 + (id % 7) as f64));
    tokens.join(" ")
}

fn write_scenario(path: &Path) {
    let lines: Vec<String> = (1..=20).map(|id| subject_line(id, id <= 2)).collect();
    fs::write(path, lines.join("\n") + "\n").expect("write dataset");
}

#[test]
fn twenty_subjects_dropping_out_after_wave_three() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("analysis.dat");
    write_scenario(&data);
    let out_dir = dir.path().join("out");

    let config = MissingConfig {
        data,
        layout: StudyLayout::six_wave(),
        out_dir: out_dir.clone(),
        alpha: 0.05,
        min_observed: 10,
    };
    let report = missing_data(&config).expect("missing-data pipeline");

    let percents: Vec<f64> = report.completeness.iter().map(|w| w.percent).collect();
    assert_eq!(percents, vec![100.0, 100.0, 100.0, 10.0, 10.0, 10.0]);
    assert!(report.completeness.iter().all(|w| w.total == 20));

    let a = &report.attrition;
    assert_eq!(a.waves_completed, vec![0, 0, 0, 18, 0, 0, 2]);
    assert_eq!(a.waves_completed.iter().sum::<usize>(), 20);
    assert_eq!(a.complete, 2);
    assert_eq!(a.monotone, 18);
    assert_eq!(a.intermittent, 0);
    assert_eq!(a.monotone_percent(), Some(100.0));
    assert_eq!(a.intermittent_percent(), Some(0.0));

    for row in &report.comparisons {
        assert_eq!(row.n_complete + row.n_incomplete, 20);
        if row.p.is_finite() {
            assert!(row.p_holm >= row.p);
        }
    }

    for name in [
        "wave_completeness.csv",
        "attrition_patterns.csv",
        "covariate_comparison.csv",
        "missing_data.log",
    ] {
        assert!(out_dir.join(name).is_file(), "{name} not written");
    }
    let attrition_csv =
        fs::read_to_string(out_dir.join("attrition_patterns.csv")).expect("read csv");
    assert!(attrition_csv.starts_with("group,value,n,percent,of"));
    assert_eq!(attrition_csv.lines().count(), 1 + 7 + 3);
}

#[test]
fn missing_dataset_terminates_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = MissingConfig {
        data: dir.path().join("absent.dat"),
        out_dir: dir.path().join("out"),
        ..MissingConfig::default()
    };
    assert!(missing_data(&config).is_err());
}
