use super::*;
use axum::{Extension, Router, body::Body, http::Request, routing::get};
use jsonwebtoken::{EncodingKey, Header, encode};
use tower::ServiceExt;

const SECRET: &str = "supersecretjwtsecretforunittesting123";

fn token(sub: &str, exp: usize, secret: &str) -> String {
    encode(
        &Header::default(),
        &BotClaims {
            sub: sub.to_string(),
            exp,
        },
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[test]
fn test_validate_bot_jwt_success() {
    let claims = validate_bot_jwt(&token("123456789", 9999999999, SECRET), &BotApiKey::new(SECRET))
        .expect("Valid token should pass");
    assert_eq!(claims.sub, "123456789");
}

#[test]
fn test_validate_bot_jwt_expired() {
    let result = validate_bot_jwt(&token("123456789", 1, SECRET), &BotApiKey::new(SECRET));
    assert!(result.is_err());
}

#[test]
fn test_validate_bot_jwt_invalid_signature() {
    let result = validate_bot_jwt(
        &token("123456789", 9999999999, "wrongsecret"),
        &BotApiKey::new(SECRET),
    );
    assert!(result.is_err());
}

async fn whoami(user: BotUser) -> String {
    user.telegram_id.to_string()
}

fn app() -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .layer(Extension(BotApiKey::new(SECRET)))
}

#[tokio::test]
async fn extractor_resolves_telegram_id() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header(
                    "Authorization",
                    format!("Bearer {}", token("42", 9999999999, SECRET)),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"42");
}

#[tokio::test]
async fn extractor_rejects_missing_header_and_bad_subject() {
    let missing = app()
        .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let not_numeric = app()
        .oneshot(
            Request::builder()
                .uri("/whoami")
                .header(
                    "Authorization",
                    format!("Bearer {}", token("not-a-number", 9999999999, SECRET)),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(not_numeric.status(), StatusCode::UNAUTHORIZED);
}
