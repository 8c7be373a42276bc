//! JSON-RPC 2.0 over WebSocket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::errors::ProviderError;

/// Opens sessions against RPC endpoints.
#[async_trait]
pub trait RpcConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn RpcSession>, ProviderError>;
}

/// One open connection. Never shared across queries.
#[async_trait]
pub trait RpcSession: Send {
    /// Sends one request and waits for the response with the matching id.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Best-effort close; errors are ignored.
    async fn close(&mut self);
}

/// Real connector using `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl RpcConnector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn RpcSession>, ProviderError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ProviderError::WebSocket(format!("connect {url}: {e}")))?;
        debug!(url, "websocket connected");
        Ok(Box::new(WsSession { stream, next_id: 0 }))
    }
}

pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
}

#[async_trait]
impl RpcSession for WsSession {
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.next_id += 1;
        let id = self.next_id;
        let payload = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        self.stream
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| ProviderError::WebSocket(format!("send: {e}")))?;

        while let Some(message) = self.stream.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(ProviderError::WebSocket(format!("receive: {e}"))),
            };

            let response: Value = serde_json::from_str(&text)
                .map_err(|e| ProviderError::Decode(format!("json-rpc frame: {e}")))?;

            // Subscription notifications and stale replies carry another id.
            if response.get("id").and_then(Value::as_u64) != Some(id) {
                trace!(method, "skipping unrelated frame");
                continue;
            }

            return parse_response(response);
        }

        Err(ProviderError::WebSocket("connection closed".into()))
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Splits a JSON-RPC response into its `result` or its `error` object.
pub fn parse_response(mut response: Value) -> Result<Value, ProviderError> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        return Err(ProviderError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }

    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ProviderError::Decode("json-rpc response without result".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_result_and_error() {
        assert_eq!(
            parse_response(json!({ "jsonrpc": "2.0", "id": 1, "result": "Polkadot" })).unwrap(),
            json!("Polkadot")
        );
        assert_eq!(
            parse_response(json!({ "jsonrpc": "2.0", "id": 1, "result": null })).unwrap(),
            Value::Null
        );

        let err = parse_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "Method not found" }
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::Rpc { code: -32601, .. }));

        assert!(matches!(
            parse_response(json!({ "jsonrpc": "2.0", "id": 1 })),
            Err(ProviderError::Decode(_))
        ));
    }
}
