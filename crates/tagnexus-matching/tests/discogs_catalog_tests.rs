use serde_json::json;
use std::time::Duration;
use tagnexus_discogs::DiscogsClient;
use tagnexus_domain::{LocalTrack, QueryStrategy, TagKey};
use tagnexus_matching::{MatchError, MatchOrchestrator, ResolveOutput};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
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

async fn mount_discovery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/releases/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "title": "Daft Punk - Discovery",
            "year": 2001,
            "artists": [{"name": "Daft Punk"}],
            "labels": [{"name": "Virgin", "catno": "V2940"}],
            "formats": [{"name": "CD"}],
            "tracklist": [
                {"position": "1", "type_": "track", "title": "One More Time", "duration": "5:20"},
                {"position": "2", "type_": "track", "title": "Aerodynamic", "duration": "3:32"},
                {"position": "3", "type_": "track", "title": "Digital Love", "duration": "5:01"}
            ]
        })))
        .mount(server)
        .await;
}

fn search_hit() -> serde_json::Value {
    json!({"results": [{"id": 7, "title": "Daft Punk - Discovery", "year": "2001", "format": ["CD"]}]})
}

#[tokio::test]
async fn test_single_track_resolves_through_discogs() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("artist", "Daft Punk"))
        .and(query_param("track", "One More Time"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_hit()))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = MatchOrchestrator::with_defaults(client_for(&server));
    let track = LocalTrack::new("t1", "Daft Punk - Discovery - 01 - One More Time.mp3").with_duration(321.0);

    let resolution = orchestrator.resolve_one(track, &CancellationToken::new()).await;

    let candidate = resolution.candidate().expect("matched");
    assert_eq!(candidate.strategy(), QueryStrategy::ArtistTitle);
    assert!(candidate.confidence() >= 0.8);
    let proposed = resolution.proposed_tags().expect("proposal");
    assert_eq!(proposed.get(&TagKey::Album).map(String::as_str), Some("Discovery"));
    assert_eq!(proposed.get(&TagKey::CatalogNumber).map(String::as_str), Some("V2940"));
    assert_eq!(proposed.get(&TagKey::TrackNumber).map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_album_resolves_through_catalog_number() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("GET"))
        .and(path("/database/search"))
        .and(query_param("catno", "V2940"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_hit()))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = MatchOrchestrator::with_defaults(client_for(&server));
    let tracks = vec![
        LocalTrack::new("a", "Daft Punk - 02 - Aerodynamic [V2940].flac").with_duration(212.0),
        LocalTrack::new("b", "Daft Punk - 03 - Digital Love [V2940].flac").with_duration(301.0),
    ];

    let output = orchestrator.resolve(tracks, &CancellationToken::new(), None).await;

    let ResolveOutput::Album(album) = output else {
        panic!("expected album mode");
    };
    assert_eq!(album.strategy, Some(QueryStrategy::CatalogNumber));
    let positions: Vec<Option<usize>> = album
        .assignment
        .entries
        .iter()
        .map(|entry| entry.candidate().and_then(|candidate| candidate.track_index))
        .collect();
    assert_eq!(positions, vec![Some(1), Some(2)]);
}

#[tokio::test]
async fn test_rejected_token_is_service_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/database/search"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "You must authenticate"})))
        .mount(&server)
        .await;

    let orchestrator = MatchOrchestrator::with_defaults(client_for(&server));
    let resolution = orchestrator
        .resolve_one(LocalTrack::new("t1", "Daft Punk - Aerodynamic.mp3"), &CancellationToken::new())
        .await;

    assert!(matches!(resolution.reason(), Some(MatchError::ServiceUnavailable(_))));
    assert_eq!(resolution.attempts.len(), 2);
}
