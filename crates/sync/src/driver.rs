use crate::backoff::Backoff;
use crate::dispatch::Dispatcher;
use crate::error::SyncError;
use crate::{CommandEnvelope, SyncConfig};
use chrono::Utc;
use domain::protocol::ClientMessage;
use domain::{AppCommand, ConnectionState, IngestEvent};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use store::Store;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

enum SessionEnd {
    // 服务端 1000 关闭 / 本地 disconnect：终态，不再重连
    Normal,
    Abnormal(String),
}

pub(crate) struct SyncWorker {
    config: SyncConfig,
    store: Store,
    dispatcher: Dispatcher,
    tx_ingest: broadcast::Sender<IngestEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl SyncWorker {
    pub(crate) fn new(
        config: SyncConfig,
        store: Store,
        tx_ingest: broadcast::Sender<IngestEvent>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            store.clone(),
            config.user_id.clone(),
            tx_ingest.clone(),
            config.notifier.clone(),
        );
        Self {
            config,
            store,
            dispatcher,
            tx_ingest,
            state_tx,
        }
    }

    // 监督循环：连接 -> 会话 -> (异常则退避重连)。取消令牌从任意状态撤下一切
    pub(crate) async fn run(
        self,
        mut rx_cmd: mpsc::Receiver<CommandEnvelope>,
        cancel: CancellationToken,
    ) -> Result<(), SyncError> {
        let mut backoff = Backoff::new(
            self.config.reconnect_base,
            self.config.max_reconnect_attempts,
        );

        loop {
            self.set_state(ConnectionState::Connecting, backoff.attempt());
            let endpoint = self.config.endpoint();

            let connected = tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(ConnectionState::Disconnected, backoff.attempt());
                    return Ok(());
                }
                result = connect_async(endpoint.as_str()) => result,
            };

            match connected {
                Ok((ws, _response)) => {
                    backoff.reset();
                    self.set_state(ConnectionState::Connected, 0);
                    info!("Connected to {}", self.config.url);

                    match self.serve(ws, &mut rx_cmd, &cancel).await {
                        SessionEnd::Normal => {
                            self.store.clear_typing().await;
                            self.set_state(ConnectionState::Disconnected, 0);
                            info!("Disconnected");
                            return Ok(());
                        }
                        SessionEnd::Abnormal(reason) => {
                            warn!("Connection lost: {}", reason);
                            self.store.clear_typing().await;
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to open socket: {}", e);
                }
            }

            match backoff.next_delay() {
                Some(delay) => {
                    self.set_state(ConnectionState::Reconnecting, backoff.attempt());
                    info!(
                        "Reconnecting in {:?} (attempt {}/{})",
                        delay,
                        backoff.attempt(),
                        self.config.max_reconnect_attempts
                    );

                    let sleep = tokio::time::sleep(delay);
                    tokio::pin!(sleep);
                    loop {
                        tokio::select! {
                            _ = &mut sleep => break,
                            _ = cancel.cancelled() => {
                                self.set_state(ConnectionState::Disconnected, backoff.attempt());
                                return Ok(());
                            }
                            // 退避期间没有出站队列：指令直接拒绝
                            Some(envelope) = rx_cmd.recv() => {
                                warn!("Not connected; dropping outbound command");
                                let _ = envelope.resp.send(Err(SyncError::NotConnected));
                            }
                        }
                    }
                }
                None => {
                    let attempts = self.config.max_reconnect_attempts;
                    error!(
                        "Reconnect attempts exhausted after {} tries; manual retry required",
                        attempts
                    );
                    self.set_state(ConnectionState::Disconnected, attempts);
                    return Err(SyncError::ReconnectExhausted { attempts });
                }
            }
        }
    }

    async fn serve(
        &self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        rx_cmd: &mut mpsc::Receiver<CommandEnvelope>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        // 进入 connected：先亮明身份，再起心跳
        let auth = ClientMessage::Auth {
            user_id: self.config.user_id.clone(),
        };
        if let Err(e) = self.send_msg(&mut sink, auth).await {
            return SessionEnd::Abnormal(format!("auth send failed: {e}"));
        }

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.tick().await; // 首个 tick 立即完成，跳过

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Normal;
                }
                _ = heartbeat.tick() => {
                    // 已知缺口：不做 pong 超时检测，半开连接发现不了
                    if let Err(e) = self.send_msg(&mut sink, ClientMessage::Ping {}).await {
                        return SessionEnd::Abnormal(format!("ping failed: {e}"));
                    }
                }
                cmd = rx_cmd.recv() => {
                    match cmd {
                        Some(envelope) => {
                            if let Err(e) = self.execute(envelope, &mut sink).await {
                                return SessionEnd::Abnormal(e.to_string());
                            }
                        }
                        // 所有句柄都没了，等同主动断开
                        None => {
                            let _ = sink.send(Message::Close(None)).await;
                            return SessionEnd::Normal;
                        }
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            // 协议错误只丢这一条消息
                            if let Err(e) = self.dispatcher.handle(text.as_str()).await {
                                warn!("Dropping malformed message: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let normal = frame
                                .as_ref()
                                .map(|f| f.code == CloseCode::Normal)
                                .unwrap_or(false);
                            if normal {
                                return SessionEnd::Normal;
                            }
                            return SessionEnd::Abnormal("server closed abnormally".to_string());
                        }
                        Some(Ok(other)) => {
                            debug!("Ignoring non-text frame: {:?}", other);
                        }
                        Some(Err(e)) => return SessionEnd::Abnormal(e.to_string()),
                        None => return SessionEnd::Abnormal("socket stream ended".to_string()),
                    }
                }
            }
        }
    }

    async fn execute(
        &self,
        envelope: CommandEnvelope,
        sink: &mut WsSink,
    ) -> Result<(), SyncError> {
        let CommandEnvelope { cmd, resp } = envelope;

        let msg = match cmd {
            AppCommand::SendComment { comment } => {
                // 本地回声路径：先乐观写入并广播，线缆上的回传靠 author_id 抑制
                self.store.append_comment(comment.clone()).await;
                let _ = self.tx_ingest.send(IngestEvent::CommentSaved {
                    resource_id: comment.resource_id.clone(),
                    comment: comment.clone(),
                });
                ClientMessage::CommentAdd(comment)
            }
            AppCommand::UpdateComment {
                comment_id,
                updates,
            } => ClientMessage::CommentUpdate {
                comment_id,
                updates,
            },
            AppCommand::DeleteComment { comment_id } => {
                ClientMessage::CommentDelete { comment_id }
            }
            AppCommand::SetTyping {
                resource_id,
                is_typing,
            } => ClientMessage::Typing {
                resource_id,
                user_id: self.config.user_id.clone(),
                is_typing,
            },
            AppCommand::Subscribe {
                resource_type,
                resource_id,
            } => ClientMessage::Subscribe {
                resource_type,
                resource_id,
            },
            AppCommand::Unsubscribe {
                resource_type,
                resource_id,
            } => ClientMessage::Unsubscribe {
                resource_type,
                resource_id,
            },
        };

        match self.send_msg(sink, msg).await {
            Ok(()) => {
                let _ = resp.send(Ok(()));
                Ok(())
            }
            Err(e) => {
                let _ = resp.send(Err(SyncError::transport(&e)));
                Err(e)
            }
        }
    }

    // 发送时统一盖时间戳
    async fn send_msg(&self, sink: &mut WsSink, msg: ClientMessage) -> Result<(), SyncError> {
        let envelope = msg.into_envelope(Utc::now())?;
        sink.send(Message::Text(envelope.to_string().into()))
            .await
            .map_err(SyncError::transport)
    }

    fn set_state(&self, state: ConnectionState, attempt: u32) {
        self.state_tx.send_replace(state);
        let _ = self
            .tx_ingest
            .send(IngestEvent::ConnectionChanged { state, attempt });
    }
}
