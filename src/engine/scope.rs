use crate::auth::{Identity, Role};
use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};

/// Store ids the identity may act on behalf of. Legacy tokens carry no
/// membership claim and are treated as a single store keyed by the subject.
pub fn store_membership(identity: &Identity) -> Vec<i64> {
    match &identity.store_ids {
        Some(ids) if !ids.is_empty() => ids.clone(),
        _ => vec![identity.subject],
    }
}

/// Effective store id for a new order. Admins must say which store they act
/// for; store identities are pinned to their membership set.
pub fn resolve_store_id(identity: &Identity, requested: Option<i64>) -> Result<i64, AppError> {
    match identity.role {
        Role::Admin => {
            requested.ok_or_else(|| AppError::Validation("store_id is required".to_string()))
        }
        Role::Store => {
            let membership = store_membership(identity);
            match requested {
                Some(store_id) if membership.contains(&store_id) => Ok(store_id),
                Some(_) => Err(AppError::Forbidden(
                    "store outside membership".to_string(),
                )),
                None if membership.len() == 1 => Ok(membership[0]),
                None => Err(AppError::Validation(
                    "ambiguous store membership, store_id is required".to_string(),
                )),
            }
        }
        Role::Courier => Err(AppError::Forbidden("forbidden".to_string())),
    }
}

/// Read-path visibility. Couriers see their own orders plus the unclaimed
/// pool; stores see their membership's orders; admins see everything.
pub fn can_view(identity: &Identity, order: &Order) -> bool {
    match identity.role {
        Role::Admin => true,
        Role::Store => store_membership(identity).contains(&order.store_id),
        Role::Courier => {
            order.courier_id == Some(identity.subject) || order.status == OrderStatus::New
        }
    }
}
