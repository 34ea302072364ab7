use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::codec;
use shared::{ClientCommand, ClientId, ServerEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection to a trivia server.
///
/// Commands go out as bincode binary frames, which switches the server to
/// binary frames for this connection. Text frames are still understood.
pub struct Connection {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    client_id: Option<ClientId>,
}

impl Connection {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to {}...", url);
        let (ws_stream, _) = connect_async(url).await?;
        let (sink, stream) = ws_stream.split();

        Ok(Connection {
            sink,
            stream,
            client_id: None,
        })
    }

    /// Id the server assigned us, known once its welcome has been read
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub async fn send(&mut self, command: &ClientCommand) -> Result<(), Box<dyn std::error::Error>> {
        let data = codec::encode_binary(command)?;
        self.sink.send(Message::binary(data)).await?;
        Ok(())
    }

    /// Waits for the next event. Returns None once the server closes the
    /// connection.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>, Box<dyn std::error::Error>> {
        while let Some(frame) = self.stream.next().await {
            let event: ServerEvent = match frame? {
                Message::Text(text) => codec::decode_text(&text)?,
                Message::Binary(data) => codec::decode_binary(&data)?,
                Message::Close(_) => break,
                _ => continue,
            };

            if let ServerEvent::Welcome { client_id } = event {
                debug!("Server assigned client id {}", client_id);
                self.client_id = Some(client_id);
            }
            return Ok(Some(event));
        }

        Ok(None)
    }

    pub async fn close(mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.sink.close().await?;
        Ok(())
    }
}
