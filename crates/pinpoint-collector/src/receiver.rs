// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::binder::BindAttribute;
use crate::bulk::reporter::now_millis;
use crate::codec::{Frame, FrameCodec};
use crate::errors::HandlerError;
use crate::handler::{bind_handshake, SpanHandler};
use futures::StreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// TCP ingest server. Each agent stream opens with a handshake followed by data frames.
pub struct IngestReceiver {
    listener: TcpListener,
    handler: Arc<SpanHandler>,
    max_frame_size: usize,
    cancel_token: CancellationToken,
}

impl IngestReceiver {
    pub async fn new(
        bind_addr: &str,
        handler: Arc<SpanHandler>,
        max_frame_size: usize,
        cancel_token: CancellationToken,
    ) -> io::Result<IngestReceiver> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!("ingest receiver listening on {}", listener.local_addr()?);
        Ok(IngestReceiver {
            listener,
            handler,
            max_frame_size,
            cancel_token,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts streams until cancelled. Every stream runs on its own task.
    pub async fn spin(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("ingest receiver stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("agent stream opened from {}", peer);
                        tokio::spawn(consume_stream(
                            stream,
                            peer,
                            Arc::clone(&self.handler),
                            self.max_frame_size,
                            self.cancel_token.child_token(),
                        ));
                    }
                    Err(e) => error!("failed to accept agent stream: {}", e),
                },
            }
        }
    }
}

async fn consume_stream(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<SpanHandler>,
    max_frame_size: usize,
    cancel_token: CancellationToken,
) {
    let mut frames = FramedRead::new(stream, FrameCodec::new(max_frame_size));
    let mut attr: Option<BindAttribute> = None;

    loop {
        let frame = tokio::select! {
            _ = cancel_token.cancelled() => break,
            frame = frames.next() => frame,
        };
        let frame = match frame {
            None => break,
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                // framing is lost past a bad frame
                warn!("closing agent stream from {}: {}", peer, e);
                break;
            }
        };

        let accepted_time = now_millis();
        match (&attr, frame) {
            (None, Frame::Handshake(handshake)) => match bind_handshake(&handshake, accepted_time) {
                Ok(bound) => {
                    info!(
                        "agent {} of {} connected from {}",
                        bound.agent_id, bound.application_name, peer
                    );
                    attr = Some(bound);
                }
                Err(e) => {
                    warn!("closing agent stream from {}: {}", peer, e);
                    break;
                }
            },
            (None, frame) => {
                warn!(
                    "closing agent stream from {}: {} ({} frame)",
                    peer,
                    HandlerError::HandshakeRequired,
                    frame.name()
                );
                break;
            }
            (Some(bound), frame) => {
                // rejections are logged and counted by the handler
                let _ = handler.handle(frame, &bound.accepted_at(accepted_time)).await;
            }
        }
    }
    debug!("agent stream from {} closed", peer);
}
