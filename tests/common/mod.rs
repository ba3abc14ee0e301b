//! Local stand-in for the TheMealDB API.
//!
//! Serves `/search.php` and `/lookup.php` on an ephemeral port, counts every
//! request, and records the last query parameter it saw.

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the fake answers every request.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// `search.php` returns both sample meals, `lookup.php` returns the one
    /// with the requested id or `{"meals": null}`.
    Normal,
    /// `{"meals": null}` for everything.
    NoMeals,
    /// `{"results": []}`.
    MissingMeals,
    /// HTTP 500.
    ServerError,
    /// 200 with a body that is not JSON.
    Malformed,
    /// Sleep before answering normally.
    Slow(Duration),
}

#[derive(Clone)]
struct FakeState {
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
    last_param: Arc<Mutex<Option<String>>>,
}

pub struct FakeMealDb {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    last_param: Arc<Mutex<Option<String>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeMealDb {
    pub async fn start(behavior: Behavior) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let last_param = Arc::new(Mutex::new(None));
        let state = FakeState {
            behavior,
            hits: hits.clone(),
            last_param: last_param.clone(),
        };

        let app = Router::new()
            .route("/search.php", get(handle_search))
            .route("/lookup.php", get(handle_lookup))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
            last_param,
            handle,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_param(&self) -> Option<String> {
        self.last_param.lock().unwrap().clone()
    }
}

impl Drop for FakeMealDb {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn teriyaki() -> Value {
    json!({
        "idMeal": "52772",
        "strMeal": "Teriyaki Chicken Casserole",
        "strCategory": "Chicken",
        "strArea": "Japanese",
        "strInstructions": "Preheat oven to 350F.\r\nSpray a pan.",
        "strMealThumb": "https://www.themealdb.com/images/media/meals/wvpsxx1468256321.jpg",
        "strTags": "Meat,Casserole",
        "strIngredient1": "soy sauce",
        "strMeasure1": "3/4 cup",
        "strIngredient2": "water",
        "strMeasure2": "1/2 cup"
    })
}

pub fn chicken_handi() -> Value {
    json!({
        "idMeal": "52795",
        "strMeal": "Chicken Handi",
        "strCategory": "Chicken",
        "strArea": "Indian",
        "strInstructions": "1. Heat oil.\n2. Add onions.",
        "strMealThumb": null,
        "strTags": null,
        "strIngredient1": "Chicken",
        "strMeasure1": "1.2 kg"
    })
}

async fn answer(state: &FakeState, param: Option<&String>, meals: impl FnOnce() -> Value) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_param.lock().unwrap() = param.cloned();

    match state.behavior {
        Behavior::Normal => axum::Json(json!({ "meals": meals() })).into_response(),
        Behavior::Slow(delay) => {
            tokio::time::sleep(delay).await;
            axum::Json(json!({ "meals": meals() })).into_response()
        }
        Behavior::NoMeals => axum::Json(json!({ "meals": null })).into_response(),
        Behavior::MissingMeals => axum::Json(json!({ "results": [] })).into_response(),
        Behavior::ServerError => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        Behavior::Malformed => (StatusCode::OK, "{ not json").into_response(),
    }
}

async fn handle_search(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    answer(&state, params.get("s"), || json!([teriyaki(), chicken_handi()])).await
}

async fn handle_lookup(
    State(state): State<FakeState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let id = params.get("i").cloned().unwrap_or_default();
    answer(&state, params.get("i"), move || {
        let found: Vec<Value> = [teriyaki(), chicken_handi()]
            .into_iter()
            .filter(|m| m["idMeal"] == id.as_str())
            .collect();
        if found.is_empty() {
            Value::Null
        } else {
            Value::Array(found)
        }
    })
    .await
}
