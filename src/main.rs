use handlebars::Handlebars;
use log::*;
use std::io;
use std::sync::Arc;

mod api_models;
mod config;
mod emitter;
mod error;
mod models;
mod routes;
mod schema;
mod status;
mod store;
mod validate;

use crate::config::Config;
use crate::status::StatusBoard;
use crate::store::Adapter;

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub adapter: Adapter,
    pub board: Arc<StatusBoard>,
    pub templates: Arc<Handlebars<'static>>,
    pub passcode: Option<String>,
}

fn fatal(what: &str, err: impl std::fmt::Display) -> io::Error {
    error!("Could not {}! {}", what, err);
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[async_std::main]
async fn main() -> Result<(), io::Error> {
    pretty_env_logger::init();

    let config = Config::from_env().map_err(|err| fatal("load configuration", err))?;

    let board = Arc::new(StatusBoard::default());
    let adapter = Adapter::from_config(&config, board.clone())
        .await
        .map_err(|err| fatal("initialize the sync adapter", err))?;

    let mut templates = Handlebars::new();
    templates
        .register_templates_directory(".hbs", &config.templates)
        .map_err(|err| fatal("load templates", err))?;

    let state = AppState {
        adapter,
        board,
        templates: Arc::new(templates),
        passcode: config.passcode.clone(),
    };

    let mut app = tide::with_state(state);
    app.with(driftwood::ApacheCombinedLogger);
    routes::register(&mut app);

    info!("Listening on {}", config.listen);
    app.listen(config.listen).await?;
    Ok(())
}
