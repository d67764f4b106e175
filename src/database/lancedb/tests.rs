use super::*;

#[test]
fn collection_schema_names() {
    assert_eq!(Collection::Participants.table_name(), "participants");
    assert_eq!(Collection::Participants.key_field(), "pid");
    assert_eq!(Collection::Hackathons.table_name(), "hackathons");
    assert_eq!(Collection::Hackathons.key_field(), "hid");
}

#[test]
fn collection_parsing() {
    assert_eq!(
        "participants".parse::<Collection>().expect("should parse"),
        Collection::Participants
    );
    assert_eq!(
        " Hackathon ".parse::<Collection>().expect("should parse"),
        Collection::Hackathons
    );

    let err = "teams".parse::<Collection>().expect_err("unknown name");
    assert!(matches!(err, RecommenderError::InvalidArgument(_)));
}

#[test]
fn key_predicate_rendering() {
    assert_eq!(
        KeyPredicate::Equals("a1").to_filter(Collection::Participants),
        "pid = 'a1'"
    );
    assert_eq!(
        KeyPredicate::NotEquals("h").to_filter(Collection::Hackathons),
        "hid != 'h'"
    );
    assert_eq!(
        KeyPredicate::All.to_filter(Collection::Participants),
        "pid IS NOT NULL"
    );
}

#[test]
fn key_predicate_escapes_quotes() {
    let filter = KeyPredicate::Equals("x' OR '1'='1").to_filter(Collection::Participants);
    assert_eq!(filter, "pid = 'x'' OR ''1''=''1'");
}

#[test]
fn key_validation() {
    assert!(validate_key("participant-42").is_ok());
    assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH)).is_ok());

    assert!(matches!(
        validate_key(""),
        Err(RecommenderError::InvalidArgument(_))
    ));
    assert!(matches!(
        validate_key("   "),
        Err(RecommenderError::InvalidArgument(_))
    ));
    assert!(matches!(
        validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)),
        Err(RecommenderError::InvalidArgument(_))
    ));
}

#[test]
fn dimension_validation() {
    assert!(validate_dimension(&[0.0, 1.0], 2).is_ok());

    let err = validate_dimension(&[0.0, 1.0, 2.0], 2).expect_err("wrong length");
    assert!(matches!(
        err,
        RecommenderError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
}

#[test]
fn timestamps_sort_chronologically() {
    let first = current_timestamp();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = current_timestamp();
    assert!(first < second);
}

#[test]
fn embedding_record_serialization() {
    let record = EmbeddingRecord::new("p1", vec![0.6, 0.8]);

    let json = serde_json::to_string(&record).expect("can serialize json");
    let deserialized: EmbeddingRecord = serde_json::from_str(&json).expect("can parse json");

    assert_eq!(record, deserialized);
}

#[test]
fn vector_validation_rejects_non_finite_components() {
    assert!(validate_vector(&[0.6, 0.8], 2).is_ok());
    assert!(validate_vector(&[0.0, 0.0], 2).is_ok());
    assert!(matches!(
        validate_vector(&[0.6, 0.8], 3),
        Err(RecommenderError::DimensionMismatch { .. })
    ));
    for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        assert!(matches!(
            validate_vector(&[0.6, bad], 2),
            Err(RecommenderError::InvalidArgument(_))
        ));
    }
}

#[test]
fn transport_failures_map_to_store_unavailable() {
    let error = map_store_error(
        "Failed to count rows",
        lancedb::Error::Runtime {
            message: "connection reset by peer".to_string(),
        },
    );
    assert!(matches!(
        error,
        RecommenderError::StoreUnavailable(ref m) if m.contains("connection reset")
    ));

    let error = map_store_error(
        format_args!("Failed to open {} table", "participants"),
        lancedb::Error::TableNotFound {
            name: "participants".to_string(),
        },
    );
    assert!(matches!(
        error,
        RecommenderError::Database(ref m) if m.starts_with("Failed to open participants table")
    ));
}
