use crate::{
    auth::Caller,
    error::AppError,
    models::{AddUserRequest, EntityId, TrackedEntity},
    store::Store,
    utils::non_blank,
};

/// Largest starting total a tracked user may be added with.
pub const MAX_INITIAL_POINTS: i64 = 1_000_000_000;

pub async fn add_tracked_entity(
    store: &dyn Store,
    owner: Caller,
    request: AddUserRequest,
) -> Result<TrackedEntity, AppError> {
    let (Some(name), Some(points)) = (non_blank(request.name), request.points) else {
        return Err(AppError::BadRequest(
            "Name and points are required".to_string(),
        ));
    };

    if points < 0 {
        return Err(AppError::BadRequest(
            "Points cannot be negative".to_string(),
        ));
    }
    if points > MAX_INITIAL_POINTS {
        return Err(AppError::BadRequest(format!(
            "Points cannot exceed {MAX_INITIAL_POINTS}"
        )));
    }

    let entity = TrackedEntity {
        id: EntityId::new(),
        user_id: owner.account_id,
        name,
        points,
    };

    store.insert_entity(&entity).await?;

    Ok(entity)
}

/// Highest total first, ties keep the order they were added in.
pub async fn list_tracked_entities(
    store: &dyn Store,
    owner: Caller,
) -> Result<Vec<TrackedEntity>, AppError> {
    let mut entities = store.entities_by_owner(owner.account_id).await?;

    entities.sort_by(|a, b| b.points.cmp(&a.points));

    Ok(entities)
}
