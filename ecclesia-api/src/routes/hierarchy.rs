/// Hierarchy lookups for the registration form
///
/// # Endpoints
///
/// - `GET /v1/hierarchy/provinces` - The province catalogue
/// - `GET /v1/hierarchy/provinces/:code/dioceses` - Dioceses of a province
/// - `GET /v1/hierarchy/:level/:id/children` - Stored rows one level down
///
/// Provinces and dioceses come from the compiled-in catalogue; lower levels
/// come from the database and only exist once someone registered with them.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{ok, ApiResponse},
};
use axum::{
    extract::{Path, State},
    Json,
};
use ecclesia_shared::models::hierarchy::{
    find_province, Hierarchy, HierarchyLevel, HierarchyNode, CATALOG,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub code: &'static str,
    pub name: &'static str,
}

pub async fn list_provinces() -> Json<ApiResponse<Vec<CatalogEntry>>> {
    ok(CATALOG
        .iter()
        .map(|p| CatalogEntry {
            code: p.code,
            name: p.name,
        })
        .collect())
}

pub async fn list_dioceses(
    Path(code): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<CatalogEntry>>>> {
    let province = find_province(&code)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown province: {}", code)))?;

    Ok(ok(province
        .dioceses
        .iter()
        .map(|d| CatalogEntry {
            code: d.code,
            name: d.name,
        })
        .collect()))
}

#[derive(Debug, Serialize)]
pub struct ChildrenResponse {
    pub level: Option<HierarchyLevel>,
    pub children: Vec<HierarchyNode>,
}

/// Parishes have no children; asking for them returns an empty list
pub async fn list_children(
    State(state): State<AppState>,
    Path((level, id)): Path<(String, Uuid)>,
) -> ApiResult<Json<ApiResponse<ChildrenResponse>>> {
    let level = HierarchyLevel::parse(&level)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown hierarchy level: {}", level)))?;

    let children = Hierarchy::children(&state.db, level, id).await?;

    Ok(ok(ChildrenResponse {
        level: level.child(),
        children,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_provinces_matches_catalog() {
        let Json(response) = list_provinces().await;
        let data = response.data.unwrap();
        assert_eq!(data.len(), CATALOG.len());
        assert!(data.iter().any(|p| p.code == "lagos"));
    }

    #[tokio::test]
    async fn test_list_dioceses() {
        let Json(response) = list_dioceses(Path("lagos".to_string())).await.unwrap();
        assert!(response.data.unwrap().iter().any(|d| d.code == "lagos-west"));

        let err = list_dioceses(Path("atlantis".to_string())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
