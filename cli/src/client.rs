use anyhow::{Context, Result};
use common::{IpcRequest, IpcResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// One request per connection, as the agent expects.
#[derive(Clone)]
pub struct Client {
    socket_path: String,
}

impl Client {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    pub async fn send(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("connecting to agent at {} (is ztd-agent running?)", self.socket_path))?;

        let request_json = serde_json::to_string(request)?;
        stream.write_all(request_json.as_bytes()).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;

        let response: IpcResponse = serde_json::from_slice(&buffer)
            .with_context(|| format!("bad response to {}", request.method()))?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn round_trips_one_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            stream.read_to_end(&mut raw).await.unwrap();
            let req: IpcRequest = serde_json::from_slice(&raw).unwrap();
            let resp = IpcResponse::ok(serde_json::json!({ "echo": req.method() }));
            stream
                .write_all(serde_json::to_string(&resp).unwrap().as_bytes())
                .await
                .unwrap();
        });

        let client = Client::new(path.to_string_lossy().into_owned());
        let resp = client.send(&IpcRequest::Whoami).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.data["echo"], "whoami");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn missing_agent_names_the_socket() {
        let client = Client::new("/nonexistent/ztd.sock");
        let err = client.send(&IpcRequest::Status).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ztd.sock"));
    }
}
