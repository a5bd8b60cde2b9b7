use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use mt_core::{MtError, Outcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::{params::FromRestQuery, MtAxumError, MtAxumState, Tenancy};

fn map_json_rejection(rejection: JsonRejection) -> MtAxumError {
    MtError::bad_request("Failed to parse the request body as JSON")
        .with_data(json!({"_schema": [rejection.to_string()]}))
        .into()
}

/// A refused write answers `204 No Content`.
fn outcome_response<R: Serialize>(outcome: Outcome<R>) -> Response {
    match outcome {
        Outcome::Completed(record) => Json(record).into_response(),
        Outcome::Refused => StatusCode::NO_CONTENT.into_response(),
    }
}

type QueryPairs = Query<HashMap<String, String>>;

pub fn service_router<R, P>(service_name: Arc<String>, state: MtAxumState<R, P>) -> Router<()>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
    P: FromRestQuery + Send + Sync + Clone + 'static,
{
    Router::new()
        .route(
            "/",
            routing::get({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<MtAxumState<R, P>>,
                      Tenancy(tenant): Tenancy,
                      Query(query): QueryPairs| async move {
                    let svc = state.app.service(&service_name)?;
                    let res = svc.find(tenant, P::from_rest_query(query)).await?;
                    Ok::<_, MtAxumError>(Json(res))
                }
            })
            .post({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<MtAxumState<R, P>>,
                      Tenancy(tenant): Tenancy,
                      Query(query): QueryPairs,
                      data: Result<Json<R>, JsonRejection>| async move {
                    let Json(data) = data.map_err(map_json_rejection)?;

                    let svc = state.app.service(&service_name)?;
                    let res = svc.create(tenant, data, P::from_rest_query(query)).await?;
                    Ok::<_, MtAxumError>(outcome_response(res))
                }
            }),
        )
        .route(
            "/{id}",
            routing::get({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<MtAxumState<R, P>>,
                      Tenancy(tenant): Tenancy,
                      Query(query): QueryPairs,
                      Path(id): Path<String>| async move {
                    let svc = state.app.service(&service_name)?;
                    let res = svc.get(tenant, &id, P::from_rest_query(query)).await?;
                    Ok::<_, MtAxumError>(Json(res))
                }
            })
            .put({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<MtAxumState<R, P>>,
                      Tenancy(tenant): Tenancy,
                      Query(query): QueryPairs,
                      Path(id): Path<String>,
                      data: Result<Json<R>, JsonRejection>| async move {
                    let Json(data) = data.map_err(map_json_rejection)?;

                    let svc = state.app.service(&service_name)?;
                    let res = svc.update(tenant, &id, data, P::from_rest_query(query)).await?;
                    Ok::<_, MtAxumError>(outcome_response(res))
                }
            })
            .patch({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<MtAxumState<R, P>>,
                      Tenancy(tenant): Tenancy,
                      Query(query): QueryPairs,
                      Path(id): Path<String>,
                      data: Result<Json<R>, JsonRejection>| async move {
                    let Json(data) = data.map_err(map_json_rejection)?;

                    let svc = state.app.service(&service_name)?;
                    let res = svc.patch(tenant, &id, data, P::from_rest_query(query)).await?;
                    Ok::<_, MtAxumError>(outcome_response(res))
                }
            })
            .delete({
                let service_name = Arc::clone(&service_name);
                move |State(state): State<MtAxumState<R, P>>,
                      Tenancy(tenant): Tenancy,
                      Query(query): QueryPairs,
                      Path(id): Path<String>| async move {
                    let svc = state.app.service(&service_name)?;
                    let res = svc.remove(tenant, &id, P::from_rest_query(query)).await?;
                    Ok::<_, MtAxumError>(outcome_response(res))
                }
            }),
        )
        .with_state(state)
}
