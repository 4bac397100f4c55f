//! TCP debug server

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::protocol::{DebugCommand, DebugResponse};

/// Trait that the application implements to handle debug commands
pub trait DebugHandler: Send + Sync + 'static {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse;
}

/// Debug server handle - keep this alive to keep the server running
pub struct DebugServer {
    _handle: tokio::task::JoinHandle<()>,
}

impl DebugServer {
    /// Start the debug server on the given port.
    /// The handler is called for each incoming command.
    /// Returns immediately -- server runs in background.
    pub fn start(handler: Arc<Mutex<dyn DebugHandler>>, port: u16) -> Self {
        let handle = tokio::spawn(async move {
            let addr = format!("127.0.0.1:{}", port);
            let listener = match TcpListener::bind(&addr).await {
                Ok(l) => {
                    log::info!("Debug server listening on {}", addr);
                    l
                }
                Err(e) => {
                    log::error!("Failed to bind debug server on {}: {}", addr, e);
                    return;
                }
            };

            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        log::info!("Debug client connected from {}", peer);
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, handler).await;
                            log::info!("Debug client disconnected: {}", peer);
                        });
                    }
                    Err(e) => {
                        log::error!("Debug server accept error: {}", e);
                    }
                }
            }
        });

        Self { _handle: handle }
    }
}

/// Answer one command line, newline terminated
pub async fn respond(line: &str, handler: &Mutex<dyn DebugHandler>) -> String {
    let response = match DebugCommand::parse(line) {
        Ok(cmd) => {
            log::debug!("Debug command: {:?}", cmd);
            let mut h = handler.lock().await;
            h.handle_command(cmd)
        }
        Err(e) => DebugResponse::error(e.to_string()),
    };

    let mut json = serde_json::to_string(&response).unwrap_or_else(|e| {
        format!("{{\"status\":\"error\",\"message\":\"Serialize error: {}\"}}", e)
    });
    json.push('\n');
    json
}

async fn handle_connection(stream: tokio::net::TcpStream, handler: Arc<Mutex<dyn DebugHandler>>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // Connection closed
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = respond(&line, &handler).await;

                if let Err(e) = writer.write_all(response.as_bytes()).await {
                    log::error!("Debug server write error: {}", e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    log::error!("Debug server flush error: {}", e);
                    break;
                }
            }
            Err(e) => {
                log::error!("Debug server read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseData;

    #[derive(Default)]
    struct Counter {
        purges: u32,
    }

    impl DebugHandler for Counter {
        fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse {
            match cmd {
                DebugCommand::Ping => DebugResponse::pong(),
                DebugCommand::PurgeViewCache => {
                    self.purges += 1;
                    DebugResponse::ok(ResponseData::ParamsUpdated {
                        description: format!("purged {} times", self.purges),
                    })
                }
                _ => DebugResponse::error("unsupported"),
            }
        }
    }

    #[tokio::test]
    async fn test_respond_round() {
        let handler: Arc<Mutex<dyn DebugHandler>> = Arc::new(Mutex::new(Counter::default()));

        let pong = respond("{\"cmd\": \"ping\"}\n", &handler).await;
        assert!(pong.ends_with('\n'));
        assert!(pong.contains("\"pong\""));

        respond(r#"{"cmd": "purge_view_cache"}"#, &handler).await;
        let second = respond(r#"{"cmd": "purge_view_cache"}"#, &handler).await;
        assert!(second.contains("purged 2 times"));

        let bad = respond("not json", &handler).await;
        assert!(bad.contains("\"status\":\"error\""));
    }
}
