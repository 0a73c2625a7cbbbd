//! In-process injection bridge.
//!
//! A per-attempt session: bind an ephemeral localhost port, launch the
//! injector which loads the helper module into the target process, and talk
//! to the helper over a WebSocket. Requests carry a correlation id; replies
//! are routed to the matching waiter through a pending map. Every call is
//! bounded by a reply timeout, and a missed reply is a failure, never an
//! assumed success.
//!
//! The helper holds no credentials of its own; the account and secret travel
//! only inside an `invoke` request for the one call that needs them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::InjectConfig;
use crate::errors::AutomationError;
use crate::types::Credential;

/// Bumped whenever the wire format changes; the helper must echo it back in
/// its hello.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeRequest<'a> {
    TriggerWindow,
    Probe,
    SetConsent { granted: bool },
    Invoke {
        account: &'a str,
        secret: &'a str,
        context: Option<&'a str>,
    },
    Detach,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum BridgeReply {
    Hello { protocol: u32 },
    WindowState { open: bool },
    ProbeResult {
        found: bool,
        #[serde(default)]
        error: Option<String>,
    },
    ConsentResult { ok: bool },
    InvokeResult {
        status: InvokeStatus,
        message: Option<String>,
    },
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum InvokeStatus {
    Ok,
    Rejected,
    Error,
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    id: &'a str,
    #[serde(flatten)]
    body: BridgeRequest<'a>,
}

#[derive(Deserialize)]
struct ReplyEnvelope {
    id: Option<String>,
    #[serde(flatten)]
    body: BridgeReply,
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<BridgeReply>>>>;

/// One attached helper inside the target process. Dropping the session tears
/// the connection down and kills the injector if it is still running.
#[derive(Debug)]
pub struct InjectionSession {
    pid: u32,
    to_helper: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    // Held only for kill_on_drop.
    _child: Option<tokio::process::Child>,
    call_timeout: Duration,
    window_wait: Duration,
}

impl InjectionSession {
    /// Launch the injector against `pid` and wait for the helper to dial
    /// back and complete the version handshake.
    pub async fn attach(cfg: &InjectConfig, pid: u32) -> Result<Self, AutomationError> {
        let (injector, helper) = match (&cfg.injector_path, &cfg.helper_path) {
            (Some(i), Some(h)) => (i.clone(), h.clone()),
            _ => {
                return Err(AutomationError::InjectionFailed(
                    "injector or helper path not configured".to_string(),
                ))
            }
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            AutomationError::InjectionFailed(format!("cannot bind bridge socket: {e}"))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| {
                AutomationError::InjectionFailed(format!("cannot read bridge socket address: {e}"))
            })?
            .port();

        info!(pid, port, "launching injector");
        let child = tokio::process::Command::new(&injector)
            .arg(&helper)
            .arg(pid.to_string())
            .arg(port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AutomationError::InjectionFailed(format!(
                    "cannot launch injector {}: {e}",
                    injector.display()
                ))
            })?;

        let (stream, peer) = timeout(cfg.attach_timeout(), listener.accept())
            .await
            .map_err(|_| {
                AutomationError::InjectionFailed(format!(
                    "helper did not connect back within {:?}",
                    cfg.attach_timeout()
                ))
            })?
            .map_err(|e| {
                AutomationError::InjectionFailed(format!("bridge accept failed: {e}"))
            })?;
        debug!(%peer, "helper connected");

        let ws = timeout(cfg.attach_timeout(), tokio_tungstenite::accept_async(stream))
            .await
            .map_err(|_| {
                AutomationError::InjectionFailed("websocket handshake timed out".to_string())
            })?
            .map_err(|e| {
                AutomationError::InjectionFailed(format!("websocket handshake failed: {e}"))
            })?;
        let (mut sink, mut source) = ws.split();

        // First frame must be the hello.
        let hello = timeout(cfg.attach_timeout(), source.next())
            .await
            .map_err(|_| {
                AutomationError::InjectionFailed("helper sent no hello in time".to_string())
            })?
            .ok_or_else(|| {
                AutomationError::InjectionFailed("helper closed before hello".to_string())
            })?
            .map_err(|e| AutomationError::InjectionFailed(format!("bridge read failed: {e}")))?;
        let text = hello.to_text().map_err(|_| {
            AutomationError::InjectionFailed("non-text hello frame".to_string())
        })?;
        match serde_json::from_str::<ReplyEnvelope>(text).map(|e| e.body) {
            Ok(BridgeReply::Hello { protocol }) if protocol == PROTOCOL_VERSION => {}
            Ok(BridgeReply::Hello { protocol }) => {
                return Err(AutomationError::InjectionFailed(format!(
                    "helper speaks protocol {protocol}, expected {PROTOCOL_VERSION}"
                )))
            }
            _ => {
                return Err(AutomationError::InjectionFailed(format!(
                    "unexpected first frame from helper: {text}"
                )))
            }
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let pending_reader = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = source.next().await {
                let Ok(text) = msg.to_text() else { continue };
                match serde_json::from_str::<ReplyEnvelope>(text) {
                    Ok(ReplyEnvelope { id: Some(id), body }) => {
                        if let Some(waiter) = pending_reader.lock().await.remove(&id) {
                            let _ = waiter.send(body);
                        } else {
                            warn!(%id, "reply with no pending waiter");
                        }
                    }
                    Ok(ReplyEnvelope { id: None, .. }) => {
                        warn!("unsolicited frame from helper");
                    }
                    Err(e) => warn!("undecodable frame from helper: {e}"),
                }
            }
            debug!("bridge connection closed");
        });

        Ok(Self {
            pid,
            to_helper: tx,
            pending,
            reader,
            writer,
            _child: Some(child),
            call_timeout: cfg.call_timeout(),
            window_wait: cfg.window_wait(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    async fn request(
        &self,
        body: BridgeRequest<'_>,
        wait: Duration,
    ) -> Result<BridgeReply, AutomationError> {
        let id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&RequestEnvelope { id: &id, body })
            .map_err(|e| AutomationError::InjectionFailed(format!("cannot encode request: {e}")))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        if self.to_helper.send(Message::Text(payload)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AutomationError::InjectionFailed(
                "bridge connection is gone".to_string(),
            ));
        }

        match timeout(wait, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AutomationError::InjectionFailed(
                "bridge closed while waiting for a reply".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(AutomationError::InjectionFailed(format!(
                    "no reply within {wait:?}; dispatch onto the target's UI thread may be blocked"
                )))
            }
        }
    }

    /// Ask the helper to open the login window from inside the process.
    pub async fn trigger_window(&self) -> Result<bool, AutomationError> {
        match self.request(BridgeRequest::TriggerWindow, self.window_wait).await? {
            BridgeReply::WindowState { open } => Ok(open),
            other => Err(unexpected("trigger_window", &other)),
        }
    }

    /// Run the capability probe inside the target process.
    pub async fn probe(&self) -> Result<bool, AutomationError> {
        match self.request(BridgeRequest::Probe, self.call_timeout).await? {
            BridgeReply::ProbeResult {
                error: Some(msg), ..
            } => Err(AutomationError::InjectionFailed(format!(
                "in-process probe failed: {msg}"
            ))),
            BridgeReply::ProbeResult { found, .. } => Ok(found),
            other => Err(unexpected("probe", &other)),
        }
    }

    /// Best effort; the login view model may not expose the consent toggle.
    pub async fn set_consent(&self, granted: bool) -> Result<bool, AutomationError> {
        match self
            .request(BridgeRequest::SetConsent { granted }, self.call_timeout)
            .await?
        {
            BridgeReply::ConsentResult { ok } => Ok(ok),
            other => Err(unexpected("set_consent", &other)),
        }
    }

    /// Invoke the login operation on the target's UI thread.
    pub async fn invoke(
        &self,
        credential: &Credential,
        context: Option<&str>,
    ) -> Result<(), AutomationError> {
        let reply = self
            .request(
                BridgeRequest::Invoke {
                    account: &credential.account,
                    secret: credential.secret(),
                    context,
                },
                self.call_timeout,
            )
            .await?;
        match reply {
            BridgeReply::InvokeResult {
                status: InvokeStatus::Ok,
                ..
            } => Ok(()),
            BridgeReply::InvokeResult {
                status: InvokeStatus::Rejected,
                message,
            } => Err(AutomationError::InvocationRejected(
                message.unwrap_or_else(|| "login invocation rejected by the target".to_string()),
            )),
            BridgeReply::InvokeResult { message, .. } => Err(AutomationError::InjectionFailed(
                message.unwrap_or_else(|| "login invocation failed inside the target".to_string()),
            )),
            other => Err(unexpected("invoke", &other)),
        }
    }

    /// Unload politely. Errors are swallowed; the session is being torn down
    /// either way.
    pub async fn detach(&self) {
        if let Ok(BridgeReply::Detached) =
            self.request(BridgeRequest::Detach, self.call_timeout).await
        {
            debug!(pid = self.pid, "helper detached");
        }
    }
}

fn unexpected(call: &str, reply: &BridgeReply) -> AutomationError {
    AutomationError::InjectionFailed(format!("unexpected reply to {call}: {reply:?}"))
}

impl Drop for InjectionSession {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn test_config(attach_ms: u64, call_ms: u64) -> InjectConfig {
        InjectConfig {
            injector_path: Some(PathBuf::from("injector.exe")),
            helper_path: Some(PathBuf::from("helper.dll")),
            process_needle: "easinote".into(),
            attach_timeout_ms: attach_ms,
            call_timeout_ms: call_ms,
            window_wait_ms: call_ms,
        }
    }

    #[tokio::test]
    async fn handshake_and_invoke_round_trip() {
        let cfg = test_config(5_000, 2_000);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Helper side.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();
            // The helper speaks first.
            sink.send(Message::Text(
                json!({"type": "hello", "protocol": PROTOCOL_VERSION}).to_string(),
            ))
            .await
            .unwrap();
            while let Some(Ok(msg)) = source.next().await {
                let req: serde_json::Value =
                    serde_json::from_str(msg.to_text().unwrap()).unwrap();
                let reply = match req["type"].as_str().unwrap() {
                    "probe" => json!({"id": req["id"], "type": "probe_result", "found": true}),
                    "invoke" => {
                        assert_eq!(req["account"], "teacher01");
                        json!({"id": req["id"], "type": "invoke_result", "status": "ok", "message": null})
                    }
                    "detach" => json!({"id": req["id"], "type": "detached"}),
                    other => panic!("unexpected request {other}"),
                };
                sink.send(Message::Text(reply.to_string())).await.unwrap();
            }
        });

        let session = attach_to_port(&cfg, port).await.unwrap();
        assert!(session.probe().await.unwrap());
        let cred = Credential::new("teacher01", "s3cret");
        session.invoke(&cred, None).await.unwrap();
        session.detach().await;
    }

    #[tokio::test]
    async fn protocol_mismatch_is_injection_failure() {
        let cfg = test_config(5_000, 2_000);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, _source) = ws.split();
            sink.send(Message::Text(
                json!({"type": "hello", "protocol": 99}).to_string(),
            ))
            .await
            .unwrap();
        });

        let err = attach_to_port(&cfg, port).await.unwrap_err();
        assert!(matches!(err, AutomationError::InjectionFailed(_)));
        assert!(err.to_string().contains("protocol 99"));
    }

    #[tokio::test]
    async fn missed_reply_is_injection_failure_not_success() {
        let cfg = test_config(5_000, 200);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();
            sink.send(Message::Text(
                json!({"type": "hello", "protocol": PROTOCOL_VERSION}).to_string(),
            ))
            .await
            .unwrap();
            // Swallow every request; the UI thread is "blocked".
            while source.next().await.is_some() {}
        });

        let session = attach_to_port(&cfg, port).await.unwrap();
        let err = session.probe().await.unwrap_err();
        assert!(matches!(err, AutomationError::InjectionFailed(_)));
        assert!(err.to_string().contains("no reply"));
    }

    /// Test-only attach that dials out to a fake helper already listening,
    /// instead of launching an injector and accepting the dial-back. The
    /// post-handshake plumbing is identical to [`InjectionSession::attach`].
    async fn attach_to_port(
        cfg: &InjectConfig,
        port: u16,
    ) -> Result<InjectionSession, AutomationError> {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
            .await
            .map_err(|e| AutomationError::InjectionFailed(format!("connect failed: {e}")))?;
        let (mut sink, mut source) = ws.split();

        let hello = timeout(cfg.attach_timeout(), source.next())
            .await
            .map_err(|_| AutomationError::InjectionFailed("no hello".to_string()))?
            .ok_or_else(|| AutomationError::InjectionFailed("closed".to_string()))?
            .map_err(|e| AutomationError::InjectionFailed(format!("read failed: {e}")))?;
        let text = hello
            .to_text()
            .map_err(|_| AutomationError::InjectionFailed("non-text hello".to_string()))?;
        match serde_json::from_str::<ReplyEnvelope>(text).map(|e| e.body) {
            Ok(BridgeReply::Hello { protocol }) if protocol == PROTOCOL_VERSION => {}
            Ok(BridgeReply::Hello { protocol }) => {
                return Err(AutomationError::InjectionFailed(format!(
                    "helper speaks protocol {protocol}, expected {PROTOCOL_VERSION}"
                )))
            }
            _ => {
                return Err(AutomationError::InjectionFailed(format!(
                    "unexpected first frame: {text}"
                )))
            }
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
        });
        let pending_reader = pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = source.next().await {
                let Ok(text) = msg.to_text() else { continue };
                if let Ok(ReplyEnvelope { id: Some(id), body }) = serde_json::from_str(text) {
                    if let Some(waiter) = pending_reader.lock().await.remove(&id) {
                        let _ = waiter.send(body);
                    }
                }
            }
        });

        Ok(InjectionSession {
            pid: 4242,
            to_helper: tx,
            pending,
            reader,
            writer,
            _child: None,
            call_timeout: cfg.call_timeout(),
            window_wait: cfg.window_wait(),
        })
    }
}
