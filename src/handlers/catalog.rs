use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Instructor, Service, StopCategory, TourStop};
use crate::state::AppState;

// Catalog reads are public: the marketing pages browse services,
// instructors and tour stops without signing in.

// GET /api/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Service>>, AppError> {
    let services = {
        let db = state.db.lock().unwrap();
        queries::list_services(&db)?
    };
    Ok(Json(services))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorResponse {
    pub id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub display_name: String,
    pub craft: Option<String>,
    pub rate: Option<f64>,
    pub rate_min: Option<f64>,
    pub rate_max: Option<f64>,
    pub rate_notes: Option<String>,
    pub materials_fee_min: Option<f64>,
    pub materials_fee_max: Option<f64>,
    pub bio: Option<String>,
}

impl From<Instructor> for InstructorResponse {
    fn from(i: Instructor) -> Self {
        InstructorResponse {
            display_name: i.display_name(),
            id: i.id,
            name: i.name,
            nickname: i.nickname,
            craft: i.craft,
            rate: i.rate,
            rate_min: i.rate_min,
            rate_max: i.rate_max,
            rate_notes: i.rate_notes,
            materials_fee_min: i.materials_fee_min,
            materials_fee_max: i.materials_fee_max,
            bio: i.bio,
        }
    }
}

// GET /api/services/:slug/instructors
pub async fn list_service_instructors(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<InstructorResponse>>, AppError> {
    let instructors = {
        let db = state.db.lock().unwrap();
        let service = queries::get_service_by_slug(&db, &slug)?
            .ok_or_else(|| AppError::NotFound(format!("service {slug}")))?;
        queries::list_instructors_for_service(&db, &service.id)?
    };

    Ok(Json(instructors.into_iter().map(Into::into).collect()))
}

// GET /api/instructors/:id
pub async fn get_instructor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InstructorResponse>, AppError> {
    let instructor = {
        let db = state.db.lock().unwrap();
        queries::get_instructor(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("instructor {id}")))?
    };

    Ok(Json(instructor.into()))
}

// GET /api/tour-stops?category=places_to_eat
#[derive(Deserialize)]
pub struct TourStopsQuery {
    pub category: String,
}

pub async fn list_tour_stops(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TourStopsQuery>,
) -> Result<Json<Vec<TourStop>>, AppError> {
    let category = StopCategory::parse(&query.category).ok_or_else(|| {
        AppError::Validation(format!("{:?} is not a tour stop category", query.category))
    })?;

    let stops = {
        let db = state.db.lock().unwrap();
        queries::list_tour_stops(&db, category)?
    };

    Ok(Json(stops))
}

// GET /api/tour-stops/:id
pub async fn get_tour_stop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TourStop>, AppError> {
    let stop = {
        let db = state.db.lock().unwrap();
        queries::get_tour_stop(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("tour stop {id}")))?
    };

    Ok(Json(stop))
}
