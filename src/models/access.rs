use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleName {
    Admin,
    Manager,
    Driver,
    Warehouse,
}

impl RoleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Admin => "admin",
            RoleName::Manager => "manager",
            RoleName::Driver => "driver",
            RoleName::Warehouse => "warehouse",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(RoleName::Admin),
            "manager" => Ok(RoleName::Manager),
            "driver" => Ok(RoleName::Driver),
            "warehouse" => Ok(RoleName::Warehouse),
            other => Err(format!(
                "unknown role: {other}, expected admin/manager/driver/warehouse"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    AddPickup,
    EditPickup,
    DeletePickup,
    CompletePickup,
    ViewPickups,
    ManageCustomers,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::AddPickup => "add_pickup",
            Permission::EditPickup => "edit_pickup",
            Permission::DeletePickup => "delete_pickup",
            Permission::CompletePickup => "complete_pickup",
            Permission::ViewPickups => "view_pickups",
            Permission::ManageCustomers => "manage_customers",
        }
    }
}

/// Capability flags attached to a role, plus the driver-scope restriction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permissions {
    pub add_pickup: bool,
    pub edit_pickup: bool,
    pub delete_pickup: bool,
    pub complete_pickup: bool,
    pub view_pickups: bool,
    pub manage_customers: bool,
    pub driver_scoped: bool,
}

impl Permissions {
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::AddPickup => self.add_pickup,
            Permission::EditPickup => self.edit_pickup,
            Permission::DeletePickup => self.delete_pickup,
            Permission::CompletePickup => self.complete_pickup,
            Permission::ViewPickups => self.view_pickups,
            Permission::ManageCustomers => self.manage_customers,
        }
    }
}

pub const DEFAULT_ROLE_TABLE: [(RoleName, Permissions); 4] = [
    (
        RoleName::Admin,
        Permissions {
            add_pickup: true,
            edit_pickup: true,
            delete_pickup: true,
            complete_pickup: true,
            view_pickups: true,
            manage_customers: true,
            driver_scoped: false,
        },
    ),
    (
        RoleName::Manager,
        Permissions {
            add_pickup: true,
            edit_pickup: true,
            delete_pickup: false,
            complete_pickup: true,
            view_pickups: true,
            manage_customers: false,
            driver_scoped: false,
        },
    ),
    (
        RoleName::Driver,
        Permissions {
            add_pickup: false,
            edit_pickup: false,
            delete_pickup: false,
            complete_pickup: true,
            view_pickups: true,
            manage_customers: false,
            driver_scoped: true,
        },
    ),
    (
        RoleName::Warehouse,
        Permissions {
            add_pickup: false,
            edit_pickup: false,
            delete_pickup: false,
            complete_pickup: false,
            view_pickups: true,
            manage_customers: false,
            driver_scoped: false,
        },
    ),
];

/// Who is calling, resolved once per request and passed into every core
/// operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub identity: Uuid,
    pub role: RoleName,
    pub permissions: Permissions,
}

impl CallerContext {
    pub fn is_driver_scoped(&self) -> bool {
        self.role == RoleName::Driver || self.permissions.driver_scoped
    }
}
