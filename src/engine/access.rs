use uuid::Uuid;

use crate::error::AppError;
use crate::models::access::{CallerContext, Permission};
use crate::models::pickup::{Pickup, PickupFilter};
use crate::store::directory::RoleLookup;

pub async fn resolve_caller(roles: &dyn RoleLookup, identity: Uuid) -> Result<CallerContext, AppError> {
    let (role, permissions) = roles
        .resolve(identity)
        .await?
        .ok_or_else(|| AppError::Forbidden(format!("unknown caller {identity}")))?;

    Ok(CallerContext {
        identity,
        role,
        permissions,
    })
}

pub fn require(caller: &CallerContext, permission: Permission) -> Result<(), AppError> {
    if caller.permissions.allows(permission) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role {} lacks {}",
            caller.role,
            permission.as_str()
        )))
    }
}

pub fn can_see(caller: &CallerContext, pickup: &Pickup) -> bool {
    !caller.is_driver_scoped() || pickup.driver_id == caller.identity
}

pub fn ensure_assigned(caller: &CallerContext, pickup: &Pickup) -> Result<(), AppError> {
    if can_see(caller, pickup) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "pickup {} is assigned to another driver",
            pickup.id
        )))
    }
}

/// Narrows a list filter to the caller's own pickups when driver-scoped. A
/// scoped caller asking for someone else's pickups keeps that driver id, so
/// the query matches nothing rather than widening.
pub fn scope_filter(caller: &CallerContext, mut filter: PickupFilter) -> PickupFilter {
    if caller.is_driver_scoped() && filter.driver_id.is_none() {
        filter.driver_id = Some(caller.identity);
    }
    filter
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{require, scope_filter};
    use crate::models::access::{CallerContext, Permission, Permissions, RoleName, DEFAULT_ROLE_TABLE};
    use crate::models::pickup::PickupFilter;

    fn caller(role: RoleName) -> CallerContext {
        let permissions = DEFAULT_ROLE_TABLE
            .iter()
            .find(|(name, _)| *name == role)
            .map(|(_, permissions)| *permissions)
            .unwrap_or_default();
        CallerContext {
            identity: Uuid::new_v4(),
            role,
            permissions,
        }
    }

    #[test]
    fn role_table_drives_capabilities() {
        assert!(require(&caller(RoleName::Admin), Permission::DeletePickup).is_ok());
        assert!(require(&caller(RoleName::Manager), Permission::DeletePickup).is_err());
        assert!(require(&caller(RoleName::Driver), Permission::AddPickup).is_err());
        assert!(require(&caller(RoleName::Driver), Permission::CompletePickup).is_ok());
        assert!(require(&caller(RoleName::Warehouse), Permission::EditPickup).is_err());
    }

    #[test]
    fn drivers_are_scoped_even_with_extra_capabilities() {
        let mut driver = caller(RoleName::Driver);
        driver.permissions = Permissions {
            driver_scoped: false,
            add_pickup: true,
            ..driver.permissions
        };

        let filter = scope_filter(&driver, PickupFilter::default());
        assert_eq!(filter.driver_id, Some(driver.identity));
    }

    #[test]
    fn unscoped_roles_keep_their_filter() {
        let manager = caller(RoleName::Manager);
        let filter = scope_filter(&manager, PickupFilter::default());
        assert_eq!(filter.driver_id, None);
    }
}
