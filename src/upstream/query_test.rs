use super::query::*;

// ========================================
// SORT TRANSFORMATION
// ========================================

#[test]
fn test_transform_sort_aggregates() {
    assert_eq!(transform_sort("-count()"), "-count");
    assert_eq!(transform_sort("-count(span.duration)"), "-count_span_duration");
    assert_eq!(transform_sort("-avg(span.self_time)"), "-avg_span_self_time");
    assert_eq!(transform_sort("count()"), "count");
    assert_eq!(transform_sort("p95(span.duration)"), "p95_span_duration");
}

#[test]
fn test_transform_sort_plain_fields_unchanged() {
    assert_eq!(transform_sort("-timestamp"), "-timestamp");
    assert_eq!(transform_sort("timestamp"), "timestamp");
    assert_eq!(transform_sort("-span.duration"), "-span.duration");
}

#[test]
fn test_transform_sort_malformed_unchanged() {
    assert_eq!(transform_sort("-count((("), "-count(((");
    assert_eq!(transform_sort("-count)"), "-count)");
    assert_eq!(transform_sort("-(span.duration)"), "-(span.duration)");
    assert_eq!(transform_sort("-count(a(b))"), "-count(a(b))");
}

#[test]
fn test_transform_sort_idempotent_without_parens() {
    for sort in ["-timestamp", "count", "-avg_span_self_time", ""] {
        let once = transform_sort(sort);
        assert_eq!(transform_sort(&once), once);
    }
}

// ========================================
// DISCOVER BUILDER
// ========================================

#[test]
fn test_discover_query_contains_transformed_sort() {
    let params = SearchParams {
        query: String::new(),
        fields: vec!["title".to_string(), "count()".to_string()],
        limit: 10,
        project_slug: None,
        stats_period: "14d".to_string(),
        sort: "-count(span.duration)".to_string(),
    };
    let encoded = build_discover_api_query(&params);
    assert!(encoded.contains("sort=-count_span_duration"), "{}", encoded);
    assert!(encoded.contains("dataset=errors"));
    assert!(encoded.contains("per_page=10"));
    assert!(encoded.contains("statsPeriod=14d"));
    // Never sampled.
    assert!(!encoded.contains("sampling"));
}

#[test]
fn test_discover_query_field_order_preserved() {
    let params = SearchParams {
        fields: vec![
            "title".to_string(),
            "project".to_string(),
            "count()".to_string(),
        ],
        ..Default::default()
    };
    let encoded = build_discover_api_query(&params);
    let first = encoded.find("field=title").unwrap();
    let second = encoded.find("field=project").unwrap();
    let third = encoded.find("field=count%28%29").unwrap();
    assert!(first < second && second < third, "{}", encoded);
}

#[test]
fn test_discover_query_optional_project() {
    let params = SearchParams {
        project_slug: Some("backend".to_string()),
        ..Default::default()
    };
    assert!(build_discover_api_query(&params).contains("project=backend"));

    let params = SearchParams::default();
    assert!(!build_discover_api_query(&params).contains("project="));
}

// ========================================
// EAP BUILDER
// ========================================

#[test]
fn test_eap_query_samples_spans_only() {
    let params = SearchParams::default();

    let spans = build_eap_api_query(&params, Dataset::Spans);
    assert!(spans.contains("dataset=spans"));
    assert!(spans.contains("sampling=NORMAL"));

    let logs = build_eap_api_query(&params, Dataset::Logs);
    assert!(logs.contains("dataset=ourlogs"));
    assert!(!logs.contains("sampling"));
}

#[test]
fn test_dataset_parsing() {
    assert_eq!("errors".parse::<Dataset>().unwrap(), Dataset::Errors);
    assert_eq!("spans".parse::<Dataset>().unwrap(), Dataset::Spans);
    assert_eq!("logs".parse::<Dataset>().unwrap(), Dataset::Logs);
    assert_eq!("ourlogs".parse::<Dataset>().unwrap(), Dataset::Logs);
    assert!("issues".parse::<Dataset>().is_err());
}
