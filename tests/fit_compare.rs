use std::fs;
use std::path::Path;

use fitreport::MemoryReportSource;
use mixreview::fit_compare::{
    ENUMERATION_CSV, FitCompareConfig, INVARIANCE_CSV, build_enumeration_table,
    build_invariance_table, class_count_pattern, fit_compare, recommend,
};

fn enumeration_report(bic: f64, proportions: &[f64], entropy: f64) -> String {
    let k = proportions.len();
    let mut s = format!(
        "THE MODEL ESTIMATION TERMINATED NORMALLY

MODEL FIT INFORMATION

Number of Free Parameters                       {npar}

Loglikelihood

          H0 Value                       {ll:.3}

Information Criteria

          Akaike (AIC)                   {aic:.3}
          Bayesian (BIC)                 {bic:.3}
          Sample-Size Adjusted BIC       {sabic:.3}

FINAL CLASS COUNTS AND PROPORTIONS FOR THE LATENT CLASSES
BASED ON THE ESTIMATED MODEL

    Latent
   Classes

",
        npar = 4 * k + 3,
        ll = -bic / 2.0 + 20.0,
        aic = bic - 40.0,
        sabic = bic - 20.0,
    );
    for (i, p) in proportions.iter().enumerate() {
        s.push_str(&format!("       {}      {:.5}      {:.5}\n", i + 1, p * 1000.0, p));
    }
    if k > 1 {
        s.push_str(&format!(
            "\nCLASSIFICATION QUALITY\n\n     Entropy                         {entropy:.3}\n"
        ));
    }
    s
}

fn invariance_report(npar: usize, chi: f64, df: f64, cfi: f64, rmsea: f64) -> String {
    format!(
        "THE MODEL ESTIMATION TERMINATED NORMALLY

MODEL FIT INFORMATION

Number of Free Parameters                       {npar}

Chi-Square Test of Model Fit

          Value                            {chi:.3}*
          Degrees of Freedom                    {df}
          P-Value                           0.0000

RMSEA (Root Mean Square Error Of Approximation)

          Estimate                           {rmsea:.3}

CFI/TLI

          CFI                                {cfi:.3}
          TLI                                {tli:.3}
",
        tli = cfi - 0.01,
    )
}

fn enumeration_set() -> Vec<(&'static str, String)> {
    vec![
        ("lcga_1class.out", enumeration_report(1000.0, &[1.0], 1.0)),
        ("lcga_2class.out", enumeration_report(950.0, &[0.6, 0.4], 0.85)),
        (
            "lcga_3class.out",
            enumeration_report(900.0, &[0.5, 0.3, 0.2], 0.85),
        ),
        (
            "lcga_4class.out",
            enumeration_report(920.0, &[0.4, 0.3, 0.2, 0.1], 0.85),
        ),
    ]
}

#[test]
fn pattern_template_compiles_to_anchored_regex() {
    let re = class_count_pattern("lcga_{k}class.out").expect("pattern");
    let caps = re.captures("lcga_12class.out").expect("match");
    assert_eq!(&caps[1], "12");
    assert!(!re.is_match("xlcga_1class.out"));
    assert!(!re.is_match("lcga_1class.out.bak"));
    assert!(!re.is_match("lcga_1classXout"));
    assert!(class_count_pattern("lcga_class.out").is_err());
    assert!(class_count_pattern("{k}_{k}.out").is_err());
}

#[test]
fn minimum_bic_recommends_three_classes() {
    let mut source = MemoryReportSource::new();
    // Inserted out of order; rows still come back ascending.
    for (id, text) in enumeration_set().into_iter().rev() {
        source.insert(id, text);
    }
    source.insert("notes.txt", "not a report");

    let pattern = class_count_pattern("lcga_{k}class.out").expect("pattern");
    let mut warnings = Vec::new();
    let rows = build_enumeration_table(&source, &pattern, &mut warnings).expect("table");
    let classes: Vec<usize> = rows.iter().map(|r| r.fit.classes).collect();
    assert_eq!(classes, vec![1, 2, 3, 4]);
    assert!(warnings.is_empty(), "{warnings:?}");

    let rec = recommend(&rows, 0.80, 0.05).expect("recommendation");
    assert_eq!(rec.classes, 3);
    assert_eq!(rec.bic, 900.0);
    assert!(rec.warnings.is_empty(), "{:?}", rec.warnings);
}

#[test]
fn recommendation_warns_on_entropy_and_small_class() {
    let mut source = MemoryReportSource::new();
    source.insert("lcga_2class.out", enumeration_report(950.0, &[0.6, 0.4], 0.9));
    source.insert(
        "lcga_3class.out",
        enumeration_report(900.0, &[0.57, 0.4, 0.03], 0.72),
    );
    let pattern = class_count_pattern("lcga_{k}class.out").expect("pattern");
    let mut warnings = Vec::new();
    let rows = build_enumeration_table(&source, &pattern, &mut warnings).expect("table");
    let rec = recommend(&rows, 0.80, 0.05).expect("recommendation");
    assert_eq!(rec.classes, 3);
    assert_eq!(rec.warnings.len(), 2);
    assert!(rec.warnings[0].contains("entropy"));
    assert!(rec.warnings[1].contains("class 3"));
}

#[test]
fn malformed_and_duplicate_reports_are_skipped() {
    let mut source = MemoryReportSource::new();
    source.insert("lcga_2class.out", enumeration_report(950.0, &[0.6, 0.4], 0.9));
    source.insert("lcga_02class.out", enumeration_report(940.0, &[0.6, 0.4], 0.9));
    // Class table disagrees with the name.
    source.insert("lcga_3class.out", enumeration_report(900.0, &[0.6, 0.4], 0.9));
    let pattern = class_count_pattern("lcga_{k}class.out").expect("pattern");
    let mut warnings = Vec::new();
    let rows = build_enumeration_table(&source, &pattern, &mut warnings).expect("table");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].report, "lcga_02class.out");
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().any(|w| w.contains("lcga_2class.out")));
    assert!(warnings.iter().any(|w| w.contains("lcga_3class.out")));
}

#[test]
fn invariance_rows_test_against_previous_step() {
    let mut source = MemoryReportSource::new();
    source.insert("configural.out", invariance_report(40, 123.456, 45.0, 0.967, 0.045));
    source.insert("partial.out", invariance_report(34, 131.0, 51.0, 0.962, 0.046));
    source.insert("full.out", invariance_report(30, 150.0, 55.0, 0.950, 0.052));
    let steps = vec![
        ("configural".to_string(), "configural.out".to_string()),
        ("partial".to_string(), "partial.out".to_string()),
        ("full".to_string(), "full.out".to_string()),
    ];
    let mut warnings = Vec::new();
    let rows = build_invariance_table(&source, &steps, &mut warnings);
    assert!(warnings.is_empty(), "{warnings:?}");
    assert_eq!(rows.len(), 3);
    assert!(rows[0].delta.is_none());

    let partial = rows[1].delta.as_ref().expect("delta");
    assert_eq!(partial.against, "configural");
    assert_eq!(partial.chi_square.delta_df, 6.0);
    assert!((partial.chi_square.delta_chi_square - 7.544).abs() < 1e-9);
    assert!((partial.delta_cfi - -0.005).abs() < 1e-9);
    assert!(partial.chi_square.p.is_some());
    assert!(partial.scaled.is_none());

    let full = rows[2].delta.as_ref().expect("delta");
    assert_eq!(full.against, "partial");
    assert_eq!(full.chi_square.delta_df, 4.0);
}

fn write_reports(dir: &Path) {
    for (id, text) in enumeration_set() {
        fs::write(dir.join(id), text).expect("write report");
    }
    fs::write(
        dir.join("invariance_configural.out"),
        invariance_report(40, 123.456, 45.0, 0.967, 0.045),
    )
    .expect("write report");
    fs::write(
        dir.join("invariance_full.out"),
        invariance_report(30, 140.0, 55.0, 0.960, 0.047),
    )
    .expect("write report");
}

#[test]
fn absent_report_is_a_warning_and_reruns_are_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let reports = dir.path().join("reports");
    fs::create_dir_all(&reports).expect("mkdir");
    write_reports(&reports);

    let config = FitCompareConfig {
        report_dir: reports,
        out_dir: dir.path().join("out"),
        ..FitCompareConfig::default()
    };
    let first = fit_compare(&config).expect("first run");
    assert!(
        first
            .warnings
            .iter()
            .any(|w| w.contains("invariance_partial.out") && w.contains("not found"))
    );
    assert_eq!(first.invariance.len(), 2);
    let full = first.invariance[1].delta.as_ref().expect("delta");
    assert_eq!(full.against, "configural");
    assert_eq!(full.chi_square.delta_df, 10.0);
    assert_eq!(first.enumeration.len(), 4);
    assert_eq!(first.recommendation.as_ref().map(|r| r.classes), Some(3));

    let inv_path = config.out_dir.join(INVARIANCE_CSV);
    let enum_path = config.out_dir.join(ENUMERATION_CSV);
    let inv_first = fs::read(&inv_path).expect("read csv");
    let enum_first = fs::read(&enum_path).expect("read csv");

    fit_compare(&config).expect("second run");
    assert_eq!(fs::read(&inv_path).expect("read csv"), inv_first);
    assert_eq!(fs::read(&enum_path).expect("read csv"), enum_first);

    let text = String::from_utf8(enum_first).expect("utf8");
    let classes: Vec<&str> = text
        .lines()
        .skip(1)
        .map(|l| l.split(',').next().unwrap_or(""))
        .collect();
    assert_eq!(classes, vec!["1", "2", "3", "4"]);
}

#[test]
fn missing_report_directory_terminates_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = FitCompareConfig {
        report_dir: dir.path().join("nowhere"),
        out_dir: dir.path().join("out"),
        ..FitCompareConfig::default()
    };
    assert!(fit_compare(&config).is_err());
}
