use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::access::{Permissions, RoleName, DEFAULT_ROLE_TABLE};
use crate::models::customer::Customer;

/// Read access to customer master data, which is owned by administrative
/// workflows outside this service.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer(&self, id: Uuid) -> Result<Option<Customer>, AppError>;

    async fn register(&self, customer: Customer) -> Result<(), AppError>;
}

#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn resolve(&self, identity: Uuid) -> Result<Option<(RoleName, Permissions)>, AppError>;
}

pub struct InMemoryDirectory {
    customers: DashMap<Uuid, Customer>,
    users: DashMap<Uuid, RoleName>,
    roles: DashMap<RoleName, Permissions>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        let roles = DashMap::new();
        for (role, permissions) in DEFAULT_ROLE_TABLE {
            roles.insert(role, permissions);
        }

        Self {
            customers: DashMap::new(),
            users: DashMap::new(),
            roles,
        }
    }

    pub fn assign_role(&self, identity: Uuid, role: RoleName) {
        self.users.insert(identity, role);
    }

    pub fn set_permissions(&self, role: RoleName, permissions: Permissions) {
        self.roles.insert(role, permissions);
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryDirectory {
    async fn customer(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(self.customers.get(&id).map(|entry| entry.value().clone()))
    }

    async fn register(&self, customer: Customer) -> Result<(), AppError> {
        self.customers.insert(customer.id, customer);
        Ok(())
    }
}

#[async_trait]
impl RoleLookup for InMemoryDirectory {
    async fn resolve(&self, identity: Uuid) -> Result<Option<(RoleName, Permissions)>, AppError> {
        let Some(role) = self.users.get(&identity).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        let permissions = self
            .roles
            .get(&role)
            .map(|entry| *entry.value())
            .unwrap_or_default();
        Ok(Some((role, permissions)))
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{InMemoryDirectory, RoleLookup};
    use crate::models::access::{Permission, Permissions, RoleName};

    #[tokio::test]
    async fn unknown_identity_resolves_to_nothing() {
        let directory = InMemoryDirectory::new();
        assert_eq!(directory.resolve(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn permissions_come_from_the_role_table() {
        let directory = InMemoryDirectory::new();
        let manager = Uuid::new_v4();
        directory.assign_role(manager, RoleName::Manager);

        let (role, permissions) = directory.resolve(manager).await.unwrap().unwrap();
        assert_eq!(role, RoleName::Manager);
        assert!(permissions.allows(Permission::AddPickup));
        assert!(!permissions.allows(Permission::DeletePickup));

        directory.set_permissions(
            RoleName::Manager,
            Permissions {
                delete_pickup: true,
                ..permissions
            },
        );
        let (_, widened) = directory.resolve(manager).await.unwrap().unwrap();
        assert!(widened.allows(Permission::DeletePickup));
    }
}
