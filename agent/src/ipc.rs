use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use common::{GuardOutcome, IpcRequest, IpcResponse, Route};
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

use crate::app::App;

/// Largest request body accepted on one connection.
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

pub async fn start_ipc_server(app: Arc<App>, socket_path: String) -> Result<JoinHandle<()>> {
    // Remove old socket if exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path)?;

    // The agent holds a live session; only the owner may talk to it.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&socket_path, perms)?;
    }

    info!("IPC server listening on {}", socket_path);

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let app = app.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, &app).await {
                            error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }))
}

async fn handle_client(mut stream: UnixStream, app: &App) -> Result<()> {
    // Clients shut down their write half after the request.
    let mut buffer = Vec::new();
    (&mut stream).take(MAX_REQUEST_BYTES + 1).read_to_end(&mut buffer).await?;

    if buffer.is_empty() {
        return Ok(());
    }

    let response = if buffer.len() as u64 > MAX_REQUEST_BYTES {
        warn!("Request over {} bytes rejected", MAX_REQUEST_BYTES);
        IpcResponse::error("Request too large")
    } else {
        match serde_json::from_slice::<IpcRequest>(&buffer) {
            Ok(req) => {
                debug!("IPC request: {:?}", RedactedMethod(&req));
                handle_request(req, app).await
            }
            Err(e) => {
                warn!("Invalid request: {}", e);
                IpcResponse::error(format!("Invalid request: {}", e))
            }
        }
    };

    let response_json = serde_json::to_string(&response)?;
    stream.write_all(response_json.as_bytes()).await?;
    stream.write_all(b"\n").await?;

    Ok(())
}

/// Logs the method only, so passwords never reach the log.
struct RedactedMethod<'a>(&'a IpcRequest);

impl std::fmt::Debug for RedactedMethod<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            IpcRequest::SignIn { email, .. } => write!(f, "SignIn {{ email: {:?} }}", email),
            IpcRequest::SignUp { email, .. } => write!(f, "SignUp {{ email: {:?} }}", email),
            other => write!(f, "{:?}", other),
        }
    }
}

pub async fn handle_request(req: IpcRequest, app: &App) -> IpcResponse {
    if let Some(route) = req.route() {
        let outcome = app.guard(route);
        if outcome != GuardOutcome::Render {
            return IpcResponse { success: false, data: json!({ "guard": outcome }) };
        }
    }

    match req {
        IpcRequest::Status => handle_status(app).await,
        IpcRequest::Navigate { path } => handle_navigate(app, &path),
        IpcRequest::SignIn { email, password } => match app.auth.sign_in(&email, &password).await {
            Ok(()) => IpcResponse::ok(json!({ "redirect": Route::Dashboard.path() })),
            Err(e) => IpcResponse::error(e.message()),
        },
        IpcRequest::SignUp { email, password } => match app.auth.sign_up(&email, &password).await {
            Ok(()) => IpcResponse::ok(json!({ "email": email })),
            Err(e) => IpcResponse::error(e.message()),
        },
        IpcRequest::SignOut => {
            app.auth.sign_out().await;
            IpcResponse::ok(json!({ "redirect": Route::Auth.path() }))
        }
        IpcRequest::Whoami => handle_whoami(app),
        IpcRequest::Users => match app.users().await {
            Some(list) => IpcResponse::ok(json!(list)),
            None => IpcResponse::error("Users page is not mounted"),
        },
        IpcRequest::Devices => match app.devices().await {
            Some(list) => IpcResponse::ok(json!(list)),
            None => IpcResponse::error("Devices page is not mounted"),
        },
        IpcRequest::RegisterDevice(form) => match app.registry.register(&app.session_state(), form).await {
            Ok(device) => IpcResponse::ok(json!(device)),
            Err(e) => IpcResponse::error(e),
        },
        IpcRequest::Policies => IpcResponse::ok(json!({
            "policies": app.policies.list().await,
            "active": app.policies.active_count().await,
        })),
        IpcRequest::CreatePolicy(form) => match app.policies.create(form).await {
            Ok(policy) => IpcResponse::ok(json!(policy)),
            Err(e) => IpcResponse::error(e),
        },
        IpcRequest::Activity { limit } => IpcResponse::ok(json!({
            "events": app.feeds.activity.recent(limit.unwrap_or(50)).await,
            "stats": app.feeds.activity.stats().await,
        })),
        IpcRequest::Alerts => IpcResponse::ok(json!({
            "alerts": app.feeds.alerts.list().await,
            "stats": app.feeds.alerts.stats().await,
        })),
        IpcRequest::ResolveAlert { id } => match app.feeds.alerts.resolve(&id).await {
            Some(alert) => IpcResponse::ok(json!(alert)),
            None => IpcResponse::error(format!("Alert {} not found", id)),
        },
        IpcRequest::Notifications { limit } => {
            IpcResponse::ok(json!({ "notifications": app.notifier.recent(limit.unwrap_or(20)) }))
        }
        IpcRequest::DeadLetters { limit } => match app.storage.recent_dead_letters(limit.unwrap_or(20)).await {
            Ok(letters) => IpcResponse::ok(json!({ "dead_letters": letters })),
            Err(e) => IpcResponse::error(format!("Database error: {}", e)),
        },
        IpcRequest::Dashboard => IpcResponse::ok(json!(app.dashboard().await)),
    }
}

async fn handle_status(app: &App) -> IpcResponse {
    let uptime_secs = (Utc::now() - app.started_at).num_seconds().max(0);
    let dead_letters = app.storage.dead_letter_count().await.unwrap_or(0);
    let state = app.session_state();

    IpcResponse::ok(json!({
        "status": "running",
        "uptime_seconds": uptime_secs,
        "backend": app.backend.name(),
        "session": state.label(),
        "socket": app.config.ipc.socket_path,
        "pages_mounted": app.devices().await.is_some(),
        "last_notification": app.notifier.latest(),
        "audit": {
            "dead_letters": dead_letters,
        },
        "feeds": {
            "activity": app.feeds.activity.stats().await,
            "alerts": app.feeds.alerts.stats().await,
        },
    }))
}

fn handle_navigate(app: &App, path: &str) -> IpcResponse {
    let route = Route::parse(path);
    let outcome = app.guard(route);
    IpcResponse::ok(json!({
        "route": route,
        "path": route.path(),
        "guard": outcome,
    }))
}

fn handle_whoami(app: &App) -> IpcResponse {
    let state = app.session_state();
    match state.session() {
        Some(session) => IpcResponse::ok(json!({
            "state": state.label(),
            "user": session.user,
            "expires_at": session.expires_at,
        })),
        None => IpcResponse::ok(json!({ "state": state.label(), "user": null })),
    }
}
