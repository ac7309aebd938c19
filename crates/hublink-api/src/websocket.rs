//! Duplex socket transport.
//!
//! A [`Connector`] opens a connection and hands back a [`Link`]: a pair of
//! channels carrying outbound text frames and inbound [`LinkEvent`]s. The
//! production [`WsConnector`] spawns a pump task that shuttles frames between
//! those channels and a tokio-tungstenite stream. Dropping the `Link`'s
//! outbound sender closes the socket.
//!
//! Keeping the socket behind channels lets the client's reactor own the
//! connection state without ever awaiting on the socket directly, and lets
//! tests script a hub without opening a port.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use url::Url;

use crate::error::Error;

const OUTBOUND_CHANNEL_CAPACITY: usize = 64;
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Something that happened on an open link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame from the hub, in arrival order.
    Frame(String),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
    /// The transport failed mid-stream.
    Failed(String),
}

/// An open connection, expressed as channels.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<LinkEvent>,
}

impl Link {
    /// Build a link from raw channel halves. Used by alternative connectors.
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<LinkEvent>) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens links to the hub.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Link, Error>>;
}

/// tokio-tungstenite backed connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Link, Error>> {
        let url = url.clone();
        Box::pin(async move { open(&url).await })
    }
}

async fn open(url: &Url) -> Result<Link, Error> {
    tracing::info!(url = %url, "connecting to hub socket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::debug!("hub socket open");

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
    let (in_tx, in_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
    tokio::spawn(pump(ws_stream, out_rx, in_tx));

    Ok(Link::new(out_tx, in_rx))
}

/// Shuttle frames until either side goes away.
async fn pump<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    mut out_rx: mpsc::Receiver<String>,
    in_tx: mpsc::Sender<LinkEvent>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            outbound = out_rx.recv() => {
                let Some(text) = outbound else {
                    // Link dropped by the owner: close politely and stop.
                    let _ = write.close().await;
                    break;
                };
                if let Err(e) = write.send(Message::text(text)).await {
                    let _ = in_tx.send(LinkEvent::Failed(e.to_string())).await;
                    break;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(LinkEvent::Frame(text.as_str().to_owned())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (ABNORMAL_CLOSURE, String::new()),
                            |cf| (u16::from(cf.code), cf.reason.to_string()),
                        );
                        tracing::info!(code, reason = %reason, "hub closed the socket");
                        let _ = in_tx.send(LinkEvent::Closed { code, reason }).await;
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary, ping, pong: tungstenite answers pings itself.
                    }
                    Some(Err(e)) => {
                        let _ = in_tx.send(LinkEvent::Failed(e.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = in_tx
                            .send(LinkEvent::Closed {
                                code: ABNORMAL_CLOSURE,
                                reason: "stream ended".into(),
                            })
                            .await;
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("socket pump exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/api/websocket")).unwrap();
        let result = WsConnector.connect(&url).await;
        assert!(matches!(result, Err(Error::WebSocketConnect(_))));
    }

    #[tokio::test]
    async fn link_carries_frames_both_ways() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (in_tx, in_rx) = mpsc::channel(4);
        let mut link = Link::new(out_tx, in_rx);

        link.outbound.send("hello".into()).await.unwrap();
        assert_eq!(out_rx.recv().await.as_deref(), Some("hello"));

        in_tx.send(LinkEvent::Frame("world".into())).await.unwrap();
        assert_eq!(link.inbound.recv().await, Some(LinkEvent::Frame("world".into())));
    }
}
