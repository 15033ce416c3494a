//! Species aggregation endpoint.

use crate::{
    auth::Requester, errors::AppError, models::species::SpeciesList, state::AppState,
};
use axum::{Json, extract::State};

/// `GET /species`: distinct species among the records the requester can see.
pub async fn list_species(
    State(state): State<AppState>,
    requester: Requester,
) -> Result<Json<SpeciesList>, AppError> {
    let results = state.records.species(requester.scope()).await?;
    Ok(Json(SpeciesList {
        count: results.len(),
        results,
    }))
}
