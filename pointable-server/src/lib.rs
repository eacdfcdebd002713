mod context;
mod errors;
mod gateway;
mod rooms;
mod schemas;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::Router;
use log::info;
use pointable_collab::Collab;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};

use gateway::Gateway;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

/// Starts the pointable server
pub async fn run_server(collab: Arc<Collab>) {
    let port = env::var("POINTABLE_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let gateway = Gateway::new();
    gateway.run(collab.clone());

    let context = ServerContext { collab, gateway };

    let version_one_router = Router::new().nest("/rooms", rooms::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");
    info!("Listening on {addr}");

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");
}
