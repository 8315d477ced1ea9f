use serde_json::json;
use std::time::Duration;
use tagnexus_discogs::{DiscogsClient, DiscogsError};
use tagnexus_domain::CatalogQuery;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> DiscogsClient {
    DiscogsClient::builder()
        .token("test-token")
        .base_url(server.uri())
        .min_request_interval(Duration::ZERO)
        .results_per_query(3)
        .build()
        .expect("client builds")
}

fn release_body(id: u64, title: &str, format: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "year": 2001,
        "artists": [{"name": "Daft Punk"}],
        "labels": [{"name": "Virgin", "catno": "V2940"}],
        "formats": [{"name": format}],
        "tracklist": [
            {"position": "", "type_": "heading", "title": "Part One", "duration": ""},
            {"position": "1", "type_": "track", "title": "One More Time", "duration": "5:20"},
            {"position": "2", "type_": "track", "title": "Aerodynamic", "duration": "3:32"}
        ]
    })
}

#[tokio::test]
async fn test_search_by_catalog_number_hydrates_release() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("type", "release"))
        .and(query_param("catno", "V2940"))
        .and(header("authorization", "Discogs token=test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 7, "title": "Daft Punk - Discovery", "year": "2001", "format": ["CD"]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/releases/7"))
        .and(header("authorization", "Discogs token=test-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(release_body(7, "Daft Punk - Discovery", "CD")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = CatalogQuery::builder()
        .catalog_number("V2940")
        .build()
        .expect("query");
    let records = client.search_releases(&query).await.expect("search succeeds");

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.release_id, Some(7));
    assert_eq!(record.title, "Discovery");
    assert_eq!(record.catalog_number.as_deref(), Some("V2940"));
    assert_eq!(record.tracks.len(), 2);
    assert_eq!(record.tracks[0].title, "One More Time");
    assert_eq!(record.tracks[0].duration_seconds, Some(320.0));
}

#[tokio::test]
async fn test_search_sends_artist_and_track_params() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("artist", "Daft Punk"))
        .and(query_param("track", "Aerodynamic"))
        .and(query_param("per_page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = CatalogQuery::builder()
        .artist("Daft Punk")
        .track_title("Aerodynamic")
        .build()
        .expect("query");
    let records = client.search_releases(&query).await.expect("search succeeds");
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_cd_releases_are_hydrated_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 1, "title": "Discovery", "year": "1999", "format": ["Vinyl"]},
                {"id": 2, "title": "Discovery", "year": "2001", "format": ["CD"]}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/releases/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_body(1, "Discovery", "Vinyl")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/releases/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_body(2, "Discovery", "CD")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = CatalogQuery::builder()
        .release_title("Discovery")
        .build()
        .expect("query");
    let records = client.search_releases(&query).await.expect("search succeeds");

    let ids: Vec<Option<u64>> = records.iter().map(|record| record.release_id).collect();
    assert_eq!(ids, vec![Some(2), Some(1)]);
}

#[tokio::test]
async fn test_unauthorized_token_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "message": "You must authenticate to access this resource."
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = CatalogQuery::builder().artist("Daft Punk").build().expect("query");
    let result = client.search_releases(&query).await;

    assert!(matches!(result, Err(DiscogsError::Unauthorized)));
}

#[tokio::test]
async fn test_server_error_is_http_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = CatalogQuery::builder().artist("Daft Punk").build().expect("query");
    let result = client.search_releases(&query).await;

    match result {
        Err(DiscogsError::HttpStatus { status, body }) => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected HttpStatus error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_release_is_skipped_when_others_load() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 10, "title": "Broken", "format": ["CD"], "year": "2000"},
                {"id": 11, "title": "Discovery", "format": ["CD"], "year": "2001"}
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/releases/10"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Release not found."})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/releases/11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_body(11, "Discovery", "CD")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let query = CatalogQuery::builder().artist("Daft Punk").build().expect("query");
    let records = client.search_releases(&query).await.expect("partial success");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].release_id, Some(11));
}

#[tokio::test]
async fn test_release_details_are_cached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/releases/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_body(7, "Discovery", "CD")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.fetch_release(7).await.expect("first fetch");
    let second = client.fetch_release(7).await.expect("cached fetch");

    assert_eq!(first, second);
}
