use crate::application::ports::{CatalogGateway, ResponseGateway};
use crate::domain::entities::{
    BatchRequest, BatchResponse, MigrationRequest, MigrationResponse, ResponseRecord,
};
use crate::domain::value_objects::{EventId, UserId};
use crate::shared::config::ApiConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// REST API クライアント。応答系・カタログ系の両ポートを実装する。
pub struct ApiClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| AppError::ConfigurationError(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            access_token: config.access_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, build_url(&self.base_url, path));
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl ResponseGateway for ApiClient {
    async fn fetch_responses(&self, user_id: &UserId) -> Result<Vec<ResponseRecord>, AppError> {
        request_json(
            self.request(Method::GET, "/responses")
                .query(&[("userId", user_id.as_str())]),
        )
        .await
    }

    async fn submit_batch(&self, request: BatchRequest) -> Result<BatchResponse, AppError> {
        debug!(
            "PUT /batch with {} actions for {}",
            request.actions.len(),
            request.user_id
        );
        request_json(self.request(Method::PUT, "/batch").json(&request)).await
    }

    async fn migrate_responses(
        &self,
        request: MigrationRequest,
    ) -> Result<MigrationResponse, AppError> {
        request_json(
            self.request(Method::POST, "/users/migrate-responses")
                .json(&request),
        )
        .await
    }
}

#[async_trait]
impl CatalogGateway for ApiClient {
    async fn fetch_events(&self) -> Result<Vec<Value>, AppError> {
        request_json(self.request(Method::GET, "/events")).await
    }

    async fn fetch_my_events(&self, user_id: &UserId) -> Result<Vec<Value>, AppError> {
        request_json(
            self.request(Method::GET, "/events/my")
                .query(&[("userId", user_id.as_str())]),
        )
        .await
    }

    async fn fetch_event(&self, event_id: &EventId) -> Result<Value, AppError> {
        request_json(self.request(Method::GET, &format!("/events/{event_id}"))).await
    }

    async fn save_event(&self, body: Value) -> Result<Value, AppError> {
        request_json(self.request(Method::POST, "/events").json(&body)).await
    }

    async fn fetch_friends(&self, user_id: &UserId) -> Result<Vec<Value>, AppError> {
        request_json(self.request(Method::GET, &format!("/users/{user_id}/friends"))).await
    }
}

fn build_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

async fn request_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, AppError> {
    let response = builder
        .send()
        .await
        .map_err(|err| AppError::Network(err.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| AppError::Network(err.to_string()))?;
    if !status.is_success() {
        return Err(AppError::Network(format!("API error ({status}): {body}")));
    }
    serde_json::from_str(&body).map_err(|err| AppError::DeserializationError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{MutationAction, RespondPayload};
    use crate::domain::value_objects::{InitialResponse, RecordId, ResponseValue};
    use serde_json::json;
    use std::io::Read;
    use std::sync::mpsc::{self, Receiver};
    use std::thread;
    use tiny_http::{Header, Response, Server};

    #[derive(Debug)]
    struct CapturedRequest {
        method: String,
        url: String,
        authorization: Option<String>,
        body: String,
    }

    fn spawn_json_server(
        status: u16,
        body: &'static str,
    ) -> (String, Receiver<CapturedRequest>, thread::JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").expect("mock server");
        let base_url = format!("http://{}/api", server.server_addr());
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let mut request = match server.recv_timeout(Duration::from_secs(5)) {
                Ok(Some(request)) => request,
                _ => return,
            };
            let mut request_body = String::new();
            let _ = request.as_reader().read_to_string(&mut request_body);
            let authorization = request
                .headers()
                .iter()
                .find(|header| header.field.equiv("Authorization"))
                .map(|header| header.value.to_string());
            let _ = tx.send(CapturedRequest {
                method: request.method().to_string(),
                url: request.url().to_string(),
                authorization,
                body: request_body,
            });

            let response = Response::from_string(body)
                .with_header(
                    Header::from_bytes("Content-Type", "application/json")
                        .expect("content-type header"),
                )
                .with_status_code(status);
            let _ = request.respond(response);
        });

        (base_url, rx, handle)
    }

    fn client(base_url: String, token: Option<&str>) -> ApiClient {
        ApiClient::new(&ApiConfig {
            base_url,
            access_token: token.map(str::to_string),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn build_url_joins_slashes() {
        assert_eq!(build_url("http://x/api/", "/batch"), "http://x/api/batch");
        assert_eq!(build_url("http://x/api", "events"), "http://x/api/events");
    }

    #[tokio::test]
    async fn fetch_responses_sends_user_query_and_parses_records() {
        let (base_url, rx, handle) = spawn_json_server(
            200,
            r#"[{"id":"r1","userId":"user-9","eventId":"evt-42","initialResponse":"invited","finalResponse":"going","createdAt":"2024-01-01T00:00:00Z"}]"#,
        );
        let api = client(base_url, None);

        let records = api
            .fetch_responses(&UserId::parse("user-9").unwrap())
            .await
            .unwrap();
        handle.join().unwrap();

        let captured = rx.recv().unwrap();
        assert_eq!(captured.method, "GET");
        assert_eq!(captured.url, "/api/responses?userId=user-9");
        assert!(captured.authorization.is_none());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].final_response, Some(ResponseValue::Going));
    }

    #[tokio::test]
    async fn fetch_responses_accepts_none_and_null_answers() {
        let (base_url, _rx, handle) = spawn_json_server(
            200,
            r#"[{"id":"r1","userId":"visit-1","eventId":"evt-42","initialResponse":"none","finalResponse":"interested","createdAt":"2024-01-01T00:00:00Z"},{"id":"r2","userId":"visit-1","eventId":"evt-42","initialResponse":null,"finalResponse":null,"createdAt":"2024-01-02T00:00:00Z"},{"id":"r3","userId":"visit-1","eventId":"evt-7","initialResponse":"interested","finalResponse":"none","createdAt":"2024-01-03T00:00:00Z"}]"#,
        );
        let api = client(base_url, None);

        let records = api
            .fetch_responses(&UserId::parse("visit-1").unwrap())
            .await
            .unwrap();
        handle.join().unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].initial_response, None);
        assert_eq!(records[0].final_response, Some(ResponseValue::Interested));
        assert_eq!(records[1].initial_response, None);
        assert_eq!(records[1].final_response, None);
        assert_eq!(
            records[2].initial_response,
            Some(InitialResponse::Prior(ResponseValue::Interested))
        );
        assert_eq!(records[2].final_response, None);
    }

    #[tokio::test]
    async fn submit_batch_puts_actions_with_bearer_token() {
        let (base_url, rx, handle) = spawn_json_server(
            200,
            r#"{"success":true,"processed":1,"results":[]}"#,
        );
        let api = client(base_url, Some("secret"));
        let user = UserId::parse("visit-1").unwrap();
        let action = MutationAction::respond(
            user.clone(),
            RespondPayload {
                event_id: EventId::parse("evt-42").unwrap(),
                response: Some(ResponseValue::Interested),
                record_id: RecordId::local(),
            },
        );

        let response = api
            .submit_batch(BatchRequest {
                actions: vec![action],
                user_id: user,
            })
            .await
            .unwrap();
        handle.join().unwrap();

        assert!(response.success);
        let captured = rx.recv().unwrap();
        assert_eq!(captured.method, "PUT");
        assert_eq!(captured.url, "/api/batch");
        assert_eq!(captured.authorization.as_deref(), Some("Bearer secret"));
        let body: Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(body["userId"], json!("visit-1"));
        assert_eq!(body["actions"][0]["type"], json!("respond-to-event"));
        assert_eq!(body["actions"][0]["payload"]["response"], json!("interested"));
    }

    #[tokio::test]
    async fn non_success_status_maps_to_network_error() {
        let (base_url, _rx, handle) = spawn_json_server(503, r#"{"error":"down"}"#);
        let api = client(base_url, None);

        let err = api
            .migrate_responses(MigrationRequest {
                source_user_id: UserId::parse("visit-1").unwrap(),
                target_user_id: UserId::parse("user-9").unwrap(),
            })
            .await
            .unwrap_err();
        handle.join().unwrap();

        match err {
            AppError::Network(message) => assert!(message.contains("503")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_maps_to_deserialization_error() {
        let (base_url, _rx, handle) = spawn_json_server(200, "not json");
        let api = client(base_url, None);

        let err = api.fetch_events().await.unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, AppError::DeserializationError(_)));
    }
}
