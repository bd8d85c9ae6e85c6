use std::fs::{self, File};
use std::io::Write;

use bzip2::Compression as BzCompression;
use bzip2::write::BzEncoder;
use flate2::Compression;
use flate2::write::GzEncoder;
use mixreview::df_utils::f64_column;
use mixreview::error::ReviewError;
use mixreview::io::{is_missing_token, read_whitespace_table};
use mixreview::layout::StudyLayout;

fn names(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn tokens() -> Vec<String> {
    names(&["-999", ".", "*", "NA"])
}

const TABLE: &str = "1 2.5 -999\n2.0 . 4\n\n3 1e1 NA\n";

#[test]
fn sentinels_become_nulls_and_ids_normalise() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("table.dat");
    fs::write(&path, TABLE).expect("write");

    let df = read_whitespace_table(&path, &names(&["ID", "A", "B"]), "ID", &tokens())
        .expect("read table");
    assert_eq!(df.height(), 3);
    let ids: Vec<Option<&str>> = df
        .column("ID")
        .expect("id")
        .str()
        .expect("string ids")
        .into_iter()
        .collect();
    assert_eq!(ids, vec![Some("1"), Some("2"), Some("3")]);
    assert_eq!(
        f64_column(&df, "A").expect("A"),
        vec![Some(2.5), None, Some(10.0)]
    );
    assert_eq!(f64_column(&df, "B").expect("B"), vec![None, Some(4.0), None]);
}

#[test]
fn numeric_sentinels_match_by_value() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("decimals.dat");
    fs::write(&path, "1 -999.0 3\n2 -999 4\n3 -999.00 .\n4 -99.9 5\n").expect("write");

    let df = read_whitespace_table(&path, &names(&["ID", "X", "Y"]), "ID", &names(&["-999", "."]))
        .expect("read table");
    assert_eq!(
        f64_column(&df, "X").expect("X"),
        vec![None, None, None, Some(-99.9)]
    );
    assert_eq!(
        f64_column(&df, "Y").expect("Y"),
        vec![Some(3.0), Some(4.0), None, Some(5.0)]
    );

    let sentinels = tokens();
    assert!(is_missing_token("-999.000", &sentinels));
    assert!(is_missing_token("NA", &sentinels));
    assert!(!is_missing_token("-9990", &sentinels));
    assert!(!is_missing_token("na", &sentinels));
}

#[test]
fn field_count_mismatch_is_a_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("short.dat");
    fs::write(&path, "1 2 3\n2 3\n").expect("write");
    let err = read_whitespace_table(&path, &names(&["ID", "A", "B"]), "ID", &tokens())
        .expect_err("short row");
    let review = err.downcast_ref::<ReviewError>().expect("review error");
    assert!(matches!(review, ReviewError::Parse(msg) if msg.contains("line 2")));
}

#[test]
fn duplicate_identifiers_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dup.dat");
    fs::write(&path, "7 1\n7.0 2\n").expect("write");
    let err = read_whitespace_table(&path, &names(&["ID", "A"]), "ID", &tokens())
        .expect_err("duplicate id");
    assert!(matches!(
        err.downcast_ref::<ReviewError>(),
        Some(ReviewError::InvalidArgument(_))
    ));
}

#[test]
fn non_numeric_value_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("text.dat");
    fs::write(&path, "1 abc\n").expect("write");
    assert!(read_whitespace_table(&path, &names(&["ID", "A"]), "ID", &tokens()).is_err());
}

#[test]
fn missing_file_is_reported_as_missing_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = read_whitespace_table(
        &dir.path().join("nope.dat"),
        &names(&["ID"]),
        "ID",
        &tokens(),
    )
    .expect_err("missing file");
    assert!(matches!(
        err.downcast_ref::<ReviewError>(),
        Some(ReviewError::MissingInput(_))
    ));
}

#[test]
fn compressed_inputs_read_like_plain_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cols = names(&["ID", "A", "B"]);

    let gz_path = dir.path().join("table.dat.gz");
    let mut gz = GzEncoder::new(File::create(&gz_path).expect("create"), Compression::default());
    gz.write_all(TABLE.as_bytes()).expect("gz write");
    gz.finish().expect("gz finish");

    let bz_path = dir.path().join("table.dat.bz2");
    let mut bz = BzEncoder::new(File::create(&bz_path).expect("create"), BzCompression::default());
    bz.write_all(TABLE.as_bytes()).expect("bz write");
    bz.finish().expect("bz finish");

    for path in [gz_path, bz_path] {
        let df = read_whitespace_table(&path, &cols, "ID", &tokens()).expect("read compressed");
        assert_eq!(df.height(), 3);
        assert_eq!(
            f64_column(&df, "A").expect("A"),
            vec![Some(2.5), None, Some(10.0)]
        );
    }
}

#[test]
fn builtin_layout_is_valid() {
    let layout = StudyLayout::six_wave();
    layout.validate().expect("six-wave layout");
    assert_eq!(layout.columns.len(), 29);
    assert_eq!(layout.waves.len(), 6);
    assert_eq!(layout.indicator_fields().len(), 18);
    assert_eq!(layout.wave_ages(), vec![12.0, 13.0, 14.0, 15.0, 16.0, 17.0]);
    assert_eq!(
        layout.continuous_covariates(),
        vec!["AGE1", "PARED", "INCOME", "ADULTDEP"]
    );
    assert_eq!(
        layout.class_file.posterior_columns(),
        vec!["CPROB1", "CPROB2", "CPROB3"]
    );
}

#[test]
fn layout_rejects_non_increasing_ages_and_unknown_fields() {
    let mut layout = StudyLayout::six_wave();
    layout.waves[3].age = layout.waves[2].age;
    assert!(matches!(
        layout.validate(),
        Err(ReviewError::InvalidArgument(_))
    ));

    let mut layout = StudyLayout::six_wave();
    layout.waves[0].fields.push("DEP9_9".to_string());
    assert!(matches!(layout.validate(), Err(ReviewError::MissingColumn(_))));

    let mut layout = StudyLayout::six_wave();
    layout.class_file.wave_scores.pop();
    assert!(layout.validate().is_err());
}

#[test]
fn layout_loads_from_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("layout.json");
    let mut value = serde_json::to_value(StudyLayout::six_wave()).expect("serialize");
    // Defaults fill in omitted optional keys.
    let obj = value.as_object_mut().expect("object");
    obj.remove("missing_tokens");
    obj.remove("design");
    fs::write(&path, serde_json::to_string_pretty(&value).expect("json")).expect("write");

    let loaded = StudyLayout::from_json_file(&path).expect("load layout");
    assert_eq!(loaded.missing_tokens, StudyLayout::six_wave().missing_tokens);
    assert!(loaded.design.is_none());
    assert_eq!(loaded.waves, StudyLayout::six_wave().waves);

    fs::write(&path, "{\"id_column\": \"ID\"}").expect("write");
    assert!(StudyLayout::from_json_file(&path).is_err());
}
