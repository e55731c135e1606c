use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use warp::filters::BoxedFilter;
use warp::{Filter, Rejection, Reply};

use super::handlers;
use super::reply::{ApiReply, handle_rejection};
use super::state::AppState;
use crate::config::AppConfig;
use crate::store::{DataLayout, EndpointStore};
use crate::tester::RequestTester;

const BODY_LIMIT: u64 = 10 * 1024 * 1024;

pub async fn run_server(config: AppConfig, config_file: Option<PathBuf>, host: IpAddr) -> Result<()> {
    let layout = DataLayout::new(&config.data_dir);
    layout
        .initialize()
        .with_context(|| format!("failed to initialize {}", layout.root.display()))?;
    let store = EndpointStore::open(&layout.endpoints)?;
    let endpoints_dir = store.root().to_path_buf();
    let tester = RequestTester::new()?;

    let port = config.port;
    let mount = config.mount_segments();
    let mount_path = config.mount_path();
    let static_dir = config.static_dir.clone();
    if static_dir.is_none() {
        info!("no static directory configured, serving the JSON API only");
    }

    let state = Arc::new(AppState::new(store, config, config_file, tester));
    let routes = routes(state, &mount, static_dir);

    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(SocketAddr::new(host, port), async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .with_context(|| format!("failed to bind {host}:{port}"))?;

    info!(
        url = %format!("http://{addr}{mount_path}"),
        endpoints = %endpoints_dir.display(),
        "API Docs Creator is running"
    );
    server.await;
    Ok(())
}

/// Every route, mounted under `mount`, with CORS, request tracing and JSON error replies.
pub fn routes(
    state: Arc<AppState>,
    mount: &[String],
    static_dir: Option<PathBuf>,
) -> BoxedFilter<(Box<dyn Reply>,)> {
    let api = api_routes(state).map(boxed).boxed();

    let app = match static_dir {
        Some(dir) => {
            let index = dir.join("index.html");
            api.or(warp::get().and(warp::fs::dir(dir)).map(boxed))
                .unify()
                .or(warp::get().and(warp::fs::file(index)).map(boxed))
                .unify()
                .boxed()
        }
        None => api,
    };

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"]);

    mount_filter(mount)
        .and(app)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::trace::request())
        .map(boxed)
        .boxed()
}

fn api_routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (ApiReply,), Error = Rejection> + Clone {
    let get_config = warp::path!("api" / "config")
        .and(warp::get())
        .and(host())
        .and(with_state(state.clone()))
        .and_then(handlers::get_config);
    let put_config = warp::path!("api" / "config")
        .and(warp::put())
        .and(host())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::update_config);

    let list_endpoints = warp::path!("api" / "endpoints")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::list_endpoints);
    let create_endpoint = warp::path!("api" / "endpoints")
        .and(warp::post())
        .and(host())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_endpoint);
    let get_endpoint = warp::path!("api" / "endpoints" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_endpoint);
    let update_endpoint = warp::path!("api" / "endpoints" / String)
        .and(warp::put())
        .and(host())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::update_endpoint);
    let delete_endpoint = warp::path!("api" / "endpoints" / String)
        .and(warp::delete())
        .and(host())
        .and(with_state(state.clone()))
        .and_then(handlers::delete_endpoint);

    let create_folder = warp::path!("api" / "folders")
        .and(warp::post())
        .and(host())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::create_folder);
    let structure = warp::path!("api" / "structure")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::get_structure);
    let test_endpoint = warp::path!("api" / "test-endpoint")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(handlers::test_endpoint);
    let health = warp::path!("health")
        .and(warp::get())
        .and(host())
        .and(with_state(state))
        .and_then(handlers::health);

    get_config
        .or(put_config)
        .unify()
        .or(list_endpoints)
        .unify()
        .or(create_endpoint)
        .unify()
        .or(get_endpoint)
        .unify()
        .or(update_endpoint)
        .unify()
        .or(delete_endpoint)
        .unify()
        .or(create_folder)
        .unify()
        .or(structure)
        .unify()
        .or(test_endpoint)
        .unify()
        .or(health)
        .unify()
}

fn mount_filter(segments: &[String]) -> BoxedFilter<()> {
    segments
        .iter()
        .fold(warp::any().boxed(), |filter, segment| {
            filter.and(warp::path(segment.clone())).boxed()
        })
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&state))
}

fn host() -> impl Filter<Extract = (Option<String>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("host")
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

fn boxed<R: Reply + 'static>(reply: R) -> Box<dyn Reply> {
    Box::new(reply)
}
