// apiserver.rs

use askama::Template;
use axum::{
    body::Body,
    extract::State,
    http::{Response, StatusCode},
    response::{Html, IntoResponse},
    routing::*,
    Json, Router,
};

use crate::*;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Template)]
#[template(path = "index.html.ask", escape = "html")]
pub struct IndexTemplate {
    pub thing_name: String,
    pub temperature: String,
    pub moisture: String,
    pub watering: String,
    pub disease: String,
    pub probability: String,
    pub last_update: String,
    pub cycles: u64,
    pub uptime_s: String,
    pub mqtt_up: bool,
    pub fw_version: &'static str,
}

impl IndexTemplate {
    pub fn new(thing_name: &str, data: &PlantData, uptime: &Uptime, mqtt_up: bool) -> Self {
        fn or_na<T: ToString>(v: &Option<T>) -> String {
            v.as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        }

        IndexTemplate {
            thing_name: thing_name.to_string(),
            temperature: data
                .temperature
                .map(|t| format!("{t:.1}"))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            moisture: or_na(&data.moisture),
            watering: match data.moisture {
                None => NOT_AVAILABLE.to_string(),
                Some(_) if data.watering => "on".to_string(),
                Some(_) => "off".to_string(),
            },
            disease: or_na(&data.disease),
            probability: or_na(&data.probability),
            last_update: data.last_update.clone(),
            cycles: data.cycles,
            uptime_s: uptime.uptime_s.clone(),
            mqtt_up,
            fw_version: FW_VERSION,
        }
    }
}

pub fn api_router(state: Arc<MyState>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/data", get(get_data))
        .route("/uptime", get(get_uptime))
        .route("/config", get(get_config))
        .with_state(state)
}

/// Serve the status API. A bind or serve failure is logged and the task
/// parks, so the monitor keeps running without its status page.
pub async fn run_api_server(state: Arc<MyState>) {
    if let Err(e) = serve_api(state).await {
        error!("API server failed: {e:#}");
    }

    // we cannot return, otherwise tokio::select in main() will exit
    loop {
        sleep(Duration::from_secs(3600)).await;
    }
}

async fn serve_api(state: Arc<MyState>) -> anyhow::Result<()> {
    let listen = format!("0.0.0.0:{}", state.config.api_port);
    let addr = listen.parse::<net::SocketAddr>()?;

    let app = api_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot listen on {listen}"))?;
    info!("API server listening to {listen}");
    Ok(axum::serve(listener, app.into_make_service()).await?)
}

pub async fn get_index(State(state): State<Arc<MyState>>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_index()");

    let page = {
        let data = state.data.read().await;
        let mqtt_up = *state.mqtt_up.read().await;
        IndexTemplate::new(&state.config.thing_name, &data, &state.uptime(), mqtt_up)
    };
    match page.render() {
        Ok(s) => (StatusCode::OK, Html(s)).into_response(),
        Err(e) => {
            let err_msg = format!("Index template error: {e:?}\n");
            error!("{err_msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, err_msg).into_response()
        }
    }
}

pub async fn get_data(State(state): State<Arc<MyState>>) -> (StatusCode, Json<PlantData>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_data()");

    let data = state.data.read().await.clone();
    (StatusCode::OK, Json(data))
}

pub async fn get_uptime(State(state): State<Arc<MyState>>) -> (StatusCode, Json<Uptime>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_uptime()");

    (StatusCode::OK, Json(state.uptime()))
}

pub async fn get_config(State(state): State<Arc<MyState>>) -> (StatusCode, Json<MyConfig>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_config()");

    (StatusCode::OK, Json(state.config.clone()))
}


// EOF
