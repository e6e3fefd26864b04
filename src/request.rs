//! Request layer: analyzes a statement carried in a URL query parameter and
//! builds upstream URLs for other extents of the same series.

use tracing::debug;
use url::Url;

use crate::config::AnalyzerConfig;
use crate::dialect::parse;
use crate::error::{ErrorKind, ParseError};
use crate::model::{Extent, RequestOptions, TimeRangeQuery};
use crate::template::interpolate_time_query;

/// Analyzes the statement in the configured query parameter of `url`.
///
/// The returned query carries the configured backfill tolerance unless the
/// statement set its own, and `template_url`: `url` with the statement
/// replaced by its template.
pub fn parse_time_range_request(
    url: &Url,
    config: &AnalyzerConfig,
) -> Result<(TimeRangeQuery, RequestOptions, bool), ParseError> {
    let statement = url
        .query_pairs()
        .find(|(name, _)| name == config.query_param.as_str())
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| ParseError::new(ErrorKind::MissingQueryParam(config.query_param.clone())))?;

    let (mut trq, ro, can_object_cache) = parse(&statement)?;
    if trq.backfill_tolerance.is_zero() {
        trq.backfill_tolerance = config.backfill_tolerance();
    }
    trq.template_url = Some(with_query_param(url, &config.query_param, &trq.statement));
    debug!(url = %url, tolerance = ?trq.backfill_tolerance, "time range request");
    Ok((trq, ro, can_object_cache))
}

/// The template URL with the statement interpolated for `extent`, or `None`
/// when the query was not built from a request.
pub fn upstream_url(
    trq: &TimeRangeQuery,
    ro: &RequestOptions,
    query_param: &str,
    extent: &Extent,
) -> Option<Url> {
    let template_url = trq.template_url.as_ref()?;
    let statement = interpolate_time_query(
        &trq.statement,
        &ro.base_timestamp_field_name,
        trq.timestamp_field.provider_format_1,
        trq.timestamp_field.provider_format_2,
        extent,
    );
    Some(with_query_param(template_url, query_param, &statement))
}

/// Replaces the value of `name`, keeping every other parameter in place.
fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == name { value.to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    let mut out = url.clone();
    out.query_pairs_mut().clear().extend_pairs(pairs);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::time::Duration;

    const STATEMENT: &str = "SELECT toStartOfMinute(datetime) AS t, count() FROM x \
                             WHERE datetime BETWEEN 1589904000 AND 1589997600 GROUP BY t FORMAT JSON";

    fn request(statement: &str) -> Url {
        Url::parse_with_params(
            "http://proxy.local:8123/?database=default",
            &[("query", statement), ("max_threads", "4")],
        )
        .unwrap()
    }

    fn param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_template_url_keeps_other_params() {
        let (trq, ro, can_object_cache) =
            parse_time_range_request(&request(STATEMENT), &AnalyzerConfig::default()).unwrap();
        assert!(can_object_cache);
        assert_eq!(ro.base_timestamp_field_name, "datetime");
        assert_eq!(trq.backfill_tolerance, Duration::from_secs(60));

        let template_url = trq.template_url.clone().unwrap();
        let names: Vec<_> = template_url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(names, vec!["database", "query", "max_threads"]);
        assert_eq!(param(&template_url, "query").as_deref(), Some(trq.statement.as_str()));
        assert_eq!(param(&template_url, "max_threads").as_deref(), Some("4"));
    }

    #[test]
    fn test_statement_directive_overrides_default_tolerance() {
        let statement = format!("/* backfill-tolerance:5 */ {STATEMENT}");
        let (trq, _, _) = parse_time_range_request(&request(&statement), &AnalyzerConfig::default()).unwrap();
        assert_eq!(trq.backfill_tolerance, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_query_param() {
        let url = Url::parse("http://proxy.local:8123/?database=default").unwrap();
        let err = parse_time_range_request(&url, &AnalyzerConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingQueryParam("query".to_string()));
    }

    #[test]
    fn test_custom_query_param() {
        let config = AnalyzerConfig { query_param: "sql".to_string(), ..Default::default() };
        let url = Url::parse_with_params("http://proxy.local/", &[("sql", STATEMENT)]).unwrap();
        let (trq, _, _) = parse_time_range_request(&url, &config).unwrap();
        assert_eq!(trq.step, Duration::from_secs(60));
    }

    #[test]
    fn test_upstream_url_for_new_extent() {
        let (trq, ro, _) = parse_time_range_request(&request(STATEMENT), &AnalyzerConfig::default()).unwrap();
        let extent = Extent::new(
            DateTime::from_timestamp(1_590_000_000, 0).unwrap(),
            DateTime::from_timestamp(1_590_003_600, 0).unwrap(),
        );
        let url = upstream_url(&trq, &ro, "query", &extent).unwrap();
        let query = param(&url, "query").unwrap();
        assert!(query.contains("WHERE datetime BETWEEN 1590000000 AND 1590003600 GROUP BY t"));
        assert!(query.ends_with("FORMAT TSVWithNamesAndTypes"));
        assert_eq!(param(&url, "database").as_deref(), Some("default"));

        let detached = TimeRangeQuery { template_url: None, ..trq };
        assert!(upstream_url(&detached, &ro, "query", &extent).is_none());
    }
}
