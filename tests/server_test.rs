//! Tests for the HTTP routes.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use strictly_chess::{ChessRules, ClientRequest, SessionHost, SessionSnapshot, Side, router};
use tower::ServiceExt;

#[tokio::test]
async fn test_health() {
    let app = router(SessionHost::spawn(ChessRules::standard(), 8, 8));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).expect("Bad request"))
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.expect("Body failed");
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_state_reports_session_snapshot() {
    let handle = SessionHost::spawn(ChessRules::standard(), 8, 8);
    let white = handle.connect().await.expect("Connect failed");
    handle
        .request(
            white.peer,
            ClientRequest::Move {
                from: "e2".parse().expect("Invalid square"),
                to: "e4".parse().expect("Invalid square"),
            },
        )
        .await
        .expect("Move rejected");

    let response = router(handle)
        .oneshot(Request::get("/state").body(Body::empty()).expect("Bad request"))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), 64 * 1024).await.expect("Body failed");
    let snapshot: SessionSnapshot = serde_json::from_slice(&body).expect("Invalid JSON");
    assert_eq!(snapshot.turn, Side::Black);
    assert_eq!(snapshot.half_moves, 1);
    assert_eq!(snapshot.seats.len(), 1);
    assert!(snapshot.terminal.is_none());
}

#[tokio::test]
async fn test_ws_without_upgrade_headers_is_refused() {
    let app = router(SessionHost::spawn(ChessRules::standard(), 8, 8));
    let response = app
        .oneshot(Request::get("/ws").body(Body::empty()).expect("Bad request"))
        .await
        .expect("Request failed");
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_operator_restart_frees_stranded_session() {
    let handle = SessionHost::spawn(ChessRules::standard(), 8, 8);
    let white = handle.connect().await.expect("Connect failed");
    let black = handle.connect().await.expect("Connect failed");
    handle
        .request(
            white.peer,
            ClientRequest::Move {
                from: "e2".parse().expect("Invalid square"),
                to: "e4".parse().expect("Invalid square"),
            },
        )
        .await
        .expect("Move rejected");
    handle.disconnect(white.peer).await.expect("Disconnect failed");
    handle.disconnect(black.peer).await.expect("Disconnect failed");
    assert!(handle.connect().await.is_err());

    let response = router(handle.clone())
        .oneshot(Request::post("/restart").body(Body::empty()).expect("Bad request"))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), 64 * 1024).await.expect("Body failed");
    let snapshot: SessionSnapshot = serde_json::from_slice(&body).expect("Invalid JSON");
    assert_eq!(snapshot.half_moves, 0);
    assert!(snapshot.seats.is_empty());

    let newcomer = handle.connect().await.expect("Seat should be free after restart");
    assert_eq!(newcomer.side, Side::White);
}

#[tokio::test]
async fn test_restart_requires_post() {
    let app = router(SessionHost::spawn(ChessRules::standard(), 8, 8));
    let response = app
        .oneshot(Request::get("/restart").body(Body::empty()).expect("Bad request"))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
