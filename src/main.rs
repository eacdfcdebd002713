use std::sync::Arc;

use log::info;
use pointable_collab::{Collab, Config, MemoryStore};
use pointable_server::run_server;

mod logging;

#[tokio::main]
async fn main() {
    logging::init_logger();

    let collab = Arc::new(Collab::new(MemoryStore::new(), Config::default()));
    collab.rooms.run_sweep();

    info!("Initialized successfully.");
    run_server(collab).await
}
