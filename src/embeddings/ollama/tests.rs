use super::*;
use crate::config::{OllamaConfig, StoreConfig};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, dimension: usize) -> Config {
    Config {
        store: StoreConfig {
            embedding_dimension: dimension,
            ..StoreConfig::default()
        },
        ollama: OllamaConfig {
            host: server.address().ip().to_string(),
            port: server.address().port(),
            embedding_model: "embed-test".to_string(),
            generation_model: "chat-test".to_string(),
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

fn test_client(server: &MockServer, dimension: usize) -> OllamaClient {
    OllamaClient::new(&test_config(server, dimension))
        .expect("Failed to create client")
        .with_retry_attempts(2)
        .with_retry_delay(Duration::from_millis(10))
}

#[test]
fn client_configuration() {
    let config = Config {
        ollama: OllamaConfig {
            host: "test-host".to_string(),
            port: 1234,
            embedding_model: "test-model".to_string(),
            retry_attempts: 5,
            ..OllamaConfig::default()
        },
        ..Config::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "test-model");
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, 5);
    assert_eq!(client.dimension, config.store.embedding_dimension);
}

#[test]
fn retry_attempts_never_drop_to_zero() {
    let client = OllamaClient::new(&Config::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(0);
    assert_eq!(client.retry_attempts, 1);
}

#[tokio::test]
async fn skills_are_joined_and_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({
            "model": "embed-test",
            "input": ["Rust, Machine Learning"],
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[3.0, 4.0]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let vector = client
        .skills_to_vector(&["Rust".to_string(), " Machine Learning ".to_string()])
        .await
        .expect("should embed skills");

    assert!((vector[0] - 0.6).abs() < 1e-6);
    assert!((vector[1] - 0.8).abs() < 1e-6);
}

#[tokio::test]
async fn empty_skill_list_is_the_zero_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server, 3);
    let vector = client
        .skills_to_vector(&[" ".to_string()])
        .await
        .expect("should embed skills");
    assert_eq!(vector, vec![0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn zero_embedding_stays_zero() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.0, 0.0]] })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let vector = client
        .skills_to_vector(&["Nothing".to_string()])
        .await
        .expect("should embed skills");
    assert_eq!(vector, vec![0.0, 0.0]);
}

#[tokio::test]
async fn wrong_embedding_size_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[1.0, 0.0, 0.0]] })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let result = client.skills_to_vector(&["Rust".to_string()]).await;
    assert!(matches!(result, Err(RecommenderError::Embedding(_))));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let result = client.skills_to_vector(&["Rust".to_string()]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let result = client.skills_to_vector(&["Rust".to_string()]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn dream_team_is_parsed_from_generation() {
    let server = MockServer::start().await;
    let answer = json!({
        "hackathon_name": "Hack the Planet",
        "required_skills": ["Rust", "", "Computer Vision"],
    })
    .to_string();
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "chat-test",
            "stream": false,
            "format": "json",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": answer })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let team = client
        .suggest_skills("name: Hack the Planet")
        .await
        .expect("should suggest skills");

    assert_eq!(team.hackathon_name, "Hack the Planet");
    assert_eq!(team.required_skills, vec!["Rust", "Computer Vision"]);
}

#[tokio::test]
async fn unparseable_generation_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "response": "no idea, sorry" })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let result = client.suggest_skills("name: Mystery").await;
    assert!(matches!(result, Err(RecommenderError::Embedding(_))));
}

#[tokio::test]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "embed-test" }, { "name": "chat-test", "size": 42 }],
        })))
        .mount(&server)
        .await;

    let client = test_client(&server, 2);
    let healthy = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("worker should finish");
    assert!(healthy.is_ok());

    let mut config = test_config(&server, 2);
    config.ollama.generation_model = "missing-model".to_string();
    let client = OllamaClient::new(&config).expect("Failed to create client");
    let unhealthy = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("worker should finish");
    assert!(unhealthy.is_err());
}
