//! Integration tests for the step sensor HTTP bridge

#[cfg(feature = "server")]
mod server_tests {
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use step_sensor_agent::config::Config;
    use step_sensor_agent::sensor::SensorKind;
    use step_sensor_agent::server::{run, ServerConfig};
    use tokio::sync::oneshot;

    async fn start_server(api_level: u32, sensors: Vec<SensorKind>) -> (SocketAddr, oneshot::Sender<()>) {
        let mut agent = Config::default();
        agent.permission.platform_api_level = api_level;
        let config = ServerConfig::new(0, sensors, agent);

        let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (addr, shutdown_tx)
    }

    async fn post(addr: SocketAddr, path: &str, body: Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(format!("http://{}{}", addr, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send request")
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start_server(28, vec![SensorKind::StepCounterCumulative]).await;

        let response = reqwest::get(format!("http://{}/health", addr))
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_pending_call_answered_after_grant() {
        let (addr, shutdown_tx) = start_server(33, vec![SensorKind::StepCounterCumulative]).await;

        let pending = tokio::spawn(post(addr, "/call/getSteps", json!({})));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pending.is_finished());

        // A second gated call while the prompt is up
        let response = post(addr, "/call/startTracking", json!({})).await;
        assert_eq!(response.status(), 409);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "PERMISSION_REQUEST_IN_PROGRESS");

        let response = post(addr, "/permission", json!({"granted": true})).await;
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["delivered"], 1);

        let response = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("Pending call never answered")
            .unwrap();
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["steps"], 0);
        assert_eq!(body["status"], "idle");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_denied_call_is_forbidden() {
        let (addr, shutdown_tx) = start_server(33, vec![SensorKind::StepCounterCumulative]).await;

        let pending = tokio::spawn(post(addr, "/call/startTracking", json!({})));
        tokio::time::sleep(Duration::from_millis(100)).await;

        post(addr, "/permission", json!({"granted": false})).await;

        let response = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("Pending call never answered")
            .unwrap();
        assert_eq!(response.status(), 403);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "PERMISSION_DENIED");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_step_updates_are_long_polled() {
        let (addr, shutdown_tx) = start_server(28, vec![SensorKind::StepCounterCumulative]).await;

        let response = post(addr, "/call/startTracking", json!({})).await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "tracking_started");
        assert_eq!(body["sensorType"], "step_counter");

        post(addr, "/sensor", json!({"value": 2000.0})).await;

        let next = tokio::spawn(async move {
            reqwest::get(format!("http://{}/updates/next", addr))
                .await
                .expect("Failed to send request")
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let response = post(addr, "/sensor", json!({"value": 2004.0})).await;
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["delivered"], 1);

        let response = tokio::time::timeout(Duration::from_secs(5), next)
            .await
            .expect("No step update")
            .unwrap();
        let update: Value = response.json().await.unwrap();
        assert_eq!(update["steps"], 4);
        assert_eq!(update["stepsSinceStart"], 4);

        let stats: Value = reqwest::get(format!("http://{}/stats", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["events_accepted"], 2);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_call_rejections() {
        let (addr, shutdown_tx) = start_server(28, vec![SensorKind::StepDetectorPulse]).await;

        let response = post(addr, "/call/setStepLength", json!({"length": -1})).await;
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "INVALID_ARGUMENT");

        let response = post(addr, "/call/setStepLength", json!({"length": 0.75})).await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["stepLength"], 0.75);

        let response = post(addr, "/call/calibrate", json!({})).await;
        assert_eq!(response.status(), 404);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_missing_sensor_is_unavailable() {
        let (addr, shutdown_tx) = start_server(28, Vec::new()).await;

        let response = post(addr, "/call/startTracking", json!({})).await;
        assert_eq!(response.status(), 503);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "SENSOR_UNAVAILABLE");

        let _ = shutdown_tx.send(());
    }
}
