//! Viewer HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocket;
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::broadcast::Broadcaster;
use crate::delivery::{
    watch_client, DeliveryConfig, DeliverySession, FrameInput, FrameSink, LatestFrame,
    MjpegSink, WebSocketSink,
};
use crate::error::Result;
use crate::media::{Quality, StreamType};
use crate::registry::StreamId;

use super::config::HttpConfig;

#[derive(Clone)]
struct AppState {
    broadcaster: Arc<Broadcaster>,
    delivery: DeliveryConfig,
}

#[derive(Debug, Default, Deserialize)]
struct StreamQuery {
    quality: Option<String>,
}

impl StreamQuery {
    /// Requested quality; unknown names fall back to the default
    fn quality(&self, id: &StreamId) -> Option<Quality> {
        let name = self.quality.as_deref()?;
        match name.parse() {
            Ok(quality) => Some(quality),
            Err(e) => {
                tracing::debug!(stream = %id, error = %e, "Ignoring requested quality");
                None
            }
        }
    }
}

/// HTTP server for viewers
///
/// Serves `/<prefix><N>` stream routes, redirects `/` to `/index.html` and
/// hands every other path to the static directory, if one is configured.
pub struct HttpServer {
    config: HttpConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: HttpConfig, broadcaster: Arc<Broadcaster>) -> Self {
        Self::with_delivery(config, broadcaster, DeliveryConfig::default())
    }

    pub fn with_delivery(
        config: HttpConfig,
        broadcaster: Arc<Broadcaster>,
        delivery: DeliveryConfig,
    ) -> Self {
        Self {
            config,
            state: AppState {
                broadcaster,
                delivery,
            },
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let mut router = Router::new().route(
            "/",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/index.html")]) }),
        );

        for index in 0..self.config.stream_routes {
            let id = StreamId::from_index(&self.config.stream_prefix, index);
            let path = format!("/{}", id);
            router = router.route(
                &path,
                get(
                    move |state: State<AppState>,
                          peer: ConnectInfo<SocketAddr>,
                          query: Query<StreamQuery>,
                          ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>| {
                        serve_stream(id.clone(), state, peer, query, ws)
                    },
                ),
            );
        }

        if let Some(ref dir) = self.config.static_dir {
            if dir.exists() {
                tracing::info!(dir = ?dir, "Serving static files");
                router = router.fallback_service(ServeDir::new(dir));
            } else {
                tracing::warn!(dir = ?dir, "Static directory does not exist, skipping");
            }
        }

        router.with_state(self.state.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            routes = self.config.stream_routes,
            "Viewer HTTP server listening"
        );
        Ok(listener)
    }

    /// Run the server
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Run the server until `shutdown` resolves
    ///
    /// Open viewer streams never finish on their own, so the server is
    /// dropped rather than drained.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.bind().await?;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    /// Serve viewers on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}

async fn serve_stream(
    id: StreamId,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<StreamQuery>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(stream_type) = state.broadcaster.stream_type(&id) else {
        tracing::debug!(stream = %id, peer = %peer, "No producer for requested stream");
        return StatusCode::NOT_FOUND.into_response();
    };

    let quality = query.quality(&id);
    match stream_type {
        StreamType::Mjpeg => serve_mjpeg(state, id, peer, quality),
        StreamType::H264 => match ws {
            Ok(ws) => ws.on_upgrade(move |socket| serve_websocket(socket, state, id, peer, quality)),
            Err(rejection) => {
                tracing::debug!(stream = %id, peer = %peer, "H.264 stream requested without WebSocket upgrade");
                rejection.into_response()
            }
        },
    }
}

fn serve_mjpeg(
    state: AppState,
    id: StreamId,
    peer: SocketAddr,
    quality: Option<Quality>,
) -> Response {
    let subscription = match state.broadcaster.add_viewer(&id, Some(peer), quality) {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::debug!(stream = %id, peer = %peer, error = %e, "Viewer refused");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let (sink, response) = MjpegSink::new();
    let input = FrameInput::Latest(LatestFrame::spawn(subscription.frames));
    let mut session = DeliverySession::new(subscription.viewer, input, sink, state.delivery);
    tokio::spawn(async move {
        session.run().await;
    });

    response
}

async fn serve_websocket(
    socket: WebSocket,
    state: AppState,
    id: StreamId,
    peer: SocketAddr,
    quality: Option<Quality>,
) {
    let (ws_tx, ws_rx) = socket.split();
    let mut sink = WebSocketSink::new(ws_tx);

    let subscription = match state.broadcaster.add_viewer(&id, Some(peer), quality) {
        Ok(subscription) => subscription,
        Err(e) => {
            // Producer went away between the check and the upgrade
            tracing::debug!(stream = %id, peer = %peer, error = %e, "Viewer refused");
            sink.close().await;
            return;
        }
    };

    let watcher = watch_client(ws_rx, Arc::clone(&subscription.viewer));
    let input = FrameInput::Direct(subscription.frames);
    let mut session = DeliverySession::new(subscription.viewer, input, sink, state.delivery);
    session.run().await;
    watcher.abort();
}
