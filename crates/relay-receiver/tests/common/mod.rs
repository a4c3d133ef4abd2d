#![allow(dead_code)]

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use relay_receiver::{
    sign, ActionInvocation, ActionRequestBody, ActionRunner, ExecutionContext, GlobalConfig,
    ReceiverConfig, SignedActionRequest,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const SECRET: &str = "integration-secret";

/// Local relay that records auth frames, sends a fixed script of frames on
/// every connection, then closes it.
pub struct MockRelay {
    pub url: String,
    connections: Arc<AtomicUsize>,
    auth_rx: mpsc::UnboundedReceiver<Value>,
    release_tx: watch::Sender<bool>,
}

impl MockRelay {
    pub async fn start(frames: Vec<Message>) -> Self {
        Self::spawn(frames, false).await
    }

    /// Like [`MockRelay::start`], but connections stay open until
    /// [`MockRelay::release`].
    pub async fn start_holding(frames: Vec<Message>) -> Self {
        Self::spawn(frames, true).await
    }

    async fn spawn(frames: Vec<Message>, hold: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = watch::channel(!hold);

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let frames = frames.clone();
                let auth_tx = auth_tx.clone();
                let mut release_rx = release_rx.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = accept_async(stream).await else {
                        return;
                    };
                    if let Some(Ok(Message::Text(text))) = ws.next().await {
                        if let Ok(value) = serde_json::from_str::<Value>(&text) {
                            let _ = auth_tx.send(value);
                        }
                    }
                    for frame in frames {
                        if ws.send(frame).await.is_err() {
                            return;
                        }
                    }
                    let _ = release_rx.wait_for(|released| *released).await;
                    let _ = ws.close(None).await;
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        Self {
            url: format!("ws://{addr}"),
            connections,
            auth_rx,
            release_tx,
        }
    }

    /// Close held connections, current and future.
    pub fn release(&self) {
        let _ = self.release_tx.send(true);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn next_auth(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(5), self.auth_rx.recv())
            .await
            .expect("timed out waiting for auth frame")
            .expect("relay stopped")
    }
}

#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<(ExecutionContext, Vec<ActionInvocation>)>>,
}

impl RecordingRunner {
    pub fn action_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, actions)| actions.iter().map(|a| a.action_name.clone()))
            .collect()
    }

    pub fn contexts(&self) -> Vec<ExecutionContext> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(context, _)| context.clone())
            .collect()
    }
}

impl ActionRunner for RecordingRunner {
    fn run_actions(
        &self,
        context: ExecutionContext,
        actions: Vec<ActionInvocation>,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push((context, actions));
        Ok(())
    }
}

pub fn global_config() -> GlobalConfig {
    GlobalConfig {
        account_id: Some("acct-1".to_string()),
        cluster_name: Some("prod".to_string()),
        signing_key: Some(SECRET.to_string()),
        target_id: "node-1".to_string(),
    }
}

pub fn receiver_config(url: &str, reconnect_delay: Duration) -> ReceiverConfig {
    ReceiverConfig {
        relay_address: url.to_string(),
        reconnect_delay,
        request_time_window_secs: 300,
        ..Default::default()
    }
}

pub fn signed_frame(action_name: &str, key: &str) -> String {
    let mut params = Map::new();
    params.insert("pod".to_string(), Value::String("web-0".to_string()));
    let body = ActionRequestBody {
        account_id: "acct-1".to_string(),
        cluster_name: "prod".to_string(),
        action_name: action_name.to_string(),
        timestamp: Utc::now().timestamp(),
        action_params: Some(params),
        sinks: Some(vec!["slack".to_string()]),
        origin: Some("console".to_string()),
    };
    let signature = sign(&body, key).unwrap();
    serde_json::to_string(&SignedActionRequest { signature, body }).unwrap()
}

pub fn text(frame: impl Into<String>) -> Message {
    Message::Text(frame.into().into())
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
