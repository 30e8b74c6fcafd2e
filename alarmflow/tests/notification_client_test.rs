// Twilio delivery and Geoapify geocoding clients using wiremock.

use serde_json::json;
use wiremock::matchers::{basic_auth, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use alarmflow::clients::{GeoapifyClient, TwilioClient};
use alarmflow::errors::DeliveryError;
use alarmflow::ports::{Geocoder, MessageDelivery};

// ── Twilio ──────────────────────────────────────────────────────────

fn twilio(server: &MockServer) -> TwilioClient {
    TwilioClient::new(reqwest::Client::new(), server.uri(), "AC123", "auth-token", "+14155238886")
}

#[tokio::test]
async fn test_send_whatsapp_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .and(basic_auth("AC123", "auth-token"))
        .and(body_string_contains("To=whatsapp%3A%2B593991111111"))
        .and(body_string_contains("From=whatsapp%3A%2B14155238886"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sid": "SM0123456789",
            "status": "queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = twilio(&server).send("+593991111111", "ALERTA DE SOS").await.unwrap();

    assert_eq!(receipt, "SM0123456789");
}

#[tokio::test]
async fn test_rejected_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"code":21211,"message":"Invalid 'To' Phone Number"}"#))
        .mount(&server)
        .await;

    let err = twilio(&server).send("+000", "hola").await.unwrap_err();

    match err {
        DeliveryError::Rejected { recipient, status, body } => {
            assert_eq!(recipient, "+000");
            assert_eq!(status, 400);
            assert!(body.contains("21211"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

// ── Geoapify ────────────────────────────────────────────────────────

fn geoapify(server: &MockServer) -> GeoapifyClient {
    GeoapifyClient::new(reqwest::Client::new(), server.uri(), "geo-key")
}

#[tokio::test]
async fn test_reverse_geocode_first_feature() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/geocode/reverse"))
        .and(query_param("lat", "-2.1894128"))
        .and(query_param("lon", "-79.8890662"))
        .and(query_param("apiKey", "geo-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "FeatureCollection",
            "features": [
                {"properties": {"formatted": "Av. 9 de Octubre, Guayaquil, Ecuador"}},
                {"properties": {"formatted": "Somewhere else"}}
            ]
        })))
        .mount(&server)
        .await;

    let address = geoapify(&server).address("-2.1894128", "-79.8890662").await;

    assert_eq!(address.as_deref(), Some("Av. 9 de Octubre, Guayaquil, Ecuador"));
}

#[tokio::test]
async fn test_no_features_is_no_address() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/geocode/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"features": []})))
        .mount(&server)
        .await;

    assert!(geoapify(&server).address("0", "0").await.is_none());
}

#[tokio::test]
async fn test_geocoder_failure_is_no_address() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert!(geoapify(&server).address("-2.1", "-79.9").await.is_none());
}
