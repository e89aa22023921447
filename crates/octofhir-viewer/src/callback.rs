//! One-shot loopback listener for the authorization redirect.
//!
//! Binds the host and port of the configured redirect URI, accepts a single
//! request on its path and hands the full redirect URL back to the caller.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use axum::Router;
use axum::extract::{RawQuery, State};
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;

const DONE_PAGE: &str = "<html><body><h3>Authorization received.</h3>\
<p>You can close this window and return to the terminal.</p></body></html>";

type CallbackSender = Arc<Mutex<Option<oneshot::Sender<Option<String>>>>>;

pub struct CallbackListener {
    redirect_uri: Url,
    listener: TcpListener,
}

impl CallbackListener {
    /// Binds the address of `redirect_uri`. Only `http` loopback redirect
    /// URIs can be served.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let redirect_uri = Url::parse(redirect_uri)
            .with_context(|| format!("Invalid redirect URI: {redirect_uri}"))?;
        if redirect_uri.scheme() != "http" {
            bail!("Cannot listen on non-http redirect URI {redirect_uri}");
        }
        let host = redirect_uri
            .host_str()
            .context("Redirect URI has no host")?
            .to_string();
        let port = redirect_uri
            .port_or_known_default()
            .context("Redirect URI has no port")?;

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("Failed to listen on {host}:{port}"))?;
        Ok(Self {
            redirect_uri,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the redirect and returns it with its query string.
    pub async fn wait(self, timeout: Duration) -> Result<Url> {
        let Self {
            mut redirect_uri,
            listener,
        } = self;
        let (tx, rx) = oneshot::channel::<Option<String>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let sender: CallbackSender = Arc::new(Mutex::new(Some(tx)));

        let path = match redirect_uri.path() {
            "" => "/",
            p => p,
        };
        let app = Router::new()
            .route(path, get(receive))
            .with_state(sender);

        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let received = tokio::time::timeout(timeout, rx).await;
        let _ = shutdown_tx.send(());
        let _ = server.await;

        let query = received
            .map_err(|_| {
                anyhow::anyhow!(
                    "Timed out after {}s waiting for the authorization callback",
                    timeout.as_secs()
                )
            })?
            .context("Callback listener stopped unexpectedly")?;

        redirect_uri.set_query(query.as_deref());
        Ok(redirect_uri)
    }
}

async fn receive(
    State(sender): State<CallbackSender>,
    RawQuery(query): RawQuery,
) -> Html<&'static str> {
    let tx = sender.lock().ok().and_then(|mut slot| slot.take());
    if let Some(tx) = tx {
        tracing::debug!("Authorization callback received");
        let _ = tx.send(query);
    }
    Html(DONE_PAGE)
}
