//! Model level access control lists

use bson::{doc, oid::ObjectId};
use tracing::debug;

use super::{Operation, ACL_MODEL, USER_GROUP_REL, USER_MODEL};
use crate::db::{DocumentStore, FindSpec};
use crate::odm::Environment;
use crate::types::{OlafError, Result};

/// Groups a user belongs to
pub async fn user_groups(store: &dyn DocumentStore, uid: ObjectId) -> Result<Vec<ObjectId>> {
    let rows = store
        .find(USER_GROUP_REL, doc! { "user_oid": uid }, FindSpec::new())
        .await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get_object_id("group_oid").ok())
        .collect())
}

/// Fail with `AccessDenied` unless the environment's user may perform `op`
/// on `model`
pub async fn check_access(env: &Environment, model: &str, op: Operation) -> Result<()> {
    if env.is_root() {
        return Ok(());
    }
    let uid = env.uid();
    let store = env.store();
    let denied = |reason: &str| {
        OlafError::AccessDenied(format!(
            "Access denied on '{}' for operation '{}' by user {}: {}",
            model, op, uid, reason
        ))
    };

    if store.count(USER_MODEL, doc! { "_id": uid }).await? == 0 {
        return Err(denied("user not found"));
    }

    let groups = user_groups(store, uid).await?;
    if groups.is_empty() {
        return Err(denied("user belongs to no group"));
    }

    let acls = store
        .find(
            ACL_MODEL,
            doc! { "group_id": { "$in": groups }, "model": model },
            FindSpec::new(),
        )
        .await?;
    let allowed = acls
        .iter()
        .any(|acl| acl.get_bool(op.acl_field()).unwrap_or(false));

    if !allowed {
        debug!(model, operation = %op, uid = %uid, acls = acls.len(), "ACL check failed");
        return Err(denied("no access rule grants it"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::MemoryStore;
    use crate::odm::RegistryBuilder;

    fn env(store: Arc<MemoryStore>, uid: ObjectId) -> Environment {
        let registry = Arc::new(RegistryBuilder::new().build().unwrap());
        Environment::new(uid, registry, store)
    }

    async fn user_in_group(store: &MemoryStore) -> (ObjectId, ObjectId) {
        let uid = ObjectId::new();
        let gid = ObjectId::new();
        store
            .insert_one(USER_MODEL, doc! { "_id": uid, "email": "u@olaf.test" })
            .await
            .unwrap();
        store
            .insert_one(
                USER_GROUP_REL,
                doc! { "_id": ObjectId::new(), "user_oid": uid, "group_oid": gid },
            )
            .await
            .unwrap();
        (uid, gid)
    }

    #[tokio::test]
    async fn test_root_bypasses() {
        let store = Arc::new(MemoryStore::new());
        let env = env(store, crate::odm::root_uid());
        assert!(check_access(&env, "anything", Operation::Unlink).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_user_denied() {
        let store = Arc::new(MemoryStore::new());
        let env = env(store, ObjectId::new());
        let err = check_access(&env, "x", Operation::Read).await.unwrap_err();
        assert!(matches!(err, OlafError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn test_user_without_groups_denied() {
        let store = Arc::new(MemoryStore::new());
        let uid = ObjectId::new();
        store
            .insert_one(USER_MODEL, doc! { "_id": uid })
            .await
            .unwrap();
        let env = env(store, uid);
        assert!(check_access(&env, "x", Operation::Read).await.is_err());
    }

    #[tokio::test]
    async fn test_acls_are_or_combined() {
        let store = Arc::new(MemoryStore::new());
        let (uid, gid) = user_in_group(&store).await;
        let other_gid = ObjectId::new();
        store
            .insert_one(
                USER_GROUP_REL,
                doc! { "_id": ObjectId::new(), "user_oid": uid, "group_oid": other_gid },
            )
            .await
            .unwrap();
        store
            .insert_one(
                ACL_MODEL,
                doc! { "_id": ObjectId::new(), "model": "x", "group_id": gid,
                       "allow_read": true, "allow_write": false },
            )
            .await
            .unwrap();
        store
            .insert_one(
                ACL_MODEL,
                doc! { "_id": ObjectId::new(), "model": "x", "group_id": other_gid,
                       "allow_read": false, "allow_write": true },
            )
            .await
            .unwrap();

        let env = env(store, uid);
        assert!(check_access(&env, "x", Operation::Read).await.is_ok());
        assert!(check_access(&env, "x", Operation::Write).await.is_ok());
        assert!(check_access(&env, "x", Operation::Create).await.is_err());
        assert!(check_access(&env, "y", Operation::Read).await.is_err());
    }
}
