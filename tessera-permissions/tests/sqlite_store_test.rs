//! SQLite grant store: persistence, scope matching and commit atomicity
#![cfg(feature = "sqlite")]

mod common;

use chrono::{Duration, Utc};
use common::{memory_sqlite_store, service_over, Document};
use std::sync::Arc;
use tessera_core::{TenantId, UserId};
use tessera_permissions::{
    ChangeSet, ContentTypeScope, Grant, GrantStore, ManualClock, PermissionSet, PermissionType,
    ResourceScope, SqliteGrantStore, Subject, SystemClock,
};

#[tokio::test]
async fn test_tenant_grant_roundtrip_keeps_both_words() {
    let store = memory_sqlite_store().await;
    let subject = Subject::member(UserId::new(), TenantId::new());
    let now = Utc::now();

    let mut grant = Grant::new(
        subject,
        [PermissionType::Read, PermissionType::Admin]
            .into_iter()
            .collect(),
        now,
    );
    grant.expires_at = Some(now + Duration::days(1));
    store
        .commit(ChangeSet::new().tenant(grant.clone()))
        .await
        .unwrap();

    let loaded = store.find_tenant_grant(&subject).await.unwrap().unwrap();
    assert_eq!(loaded, grant);
    assert_eq!(loaded.permissions.flags2(), 1);
}

#[tokio::test]
async fn test_null_subject_columns_match_exactly() {
    let store = memory_sqlite_store().await;
    let tenant = TenantId::new();
    let user = UserId::new();
    let now = Utc::now();

    store
        .commit(
            ChangeSet::new()
                .tenant(Grant::new(
                    Subject::GlobalDefault,
                    PermissionSet::from_iter([PermissionType::Read]),
                    now,
                ))
                .tenant(Grant::new(
                    Subject::tenant_default(tenant),
                    PermissionSet::from_iter([PermissionType::Edit]),
                    now,
                ))
                .tenant(Grant::new(
                    Subject::user(user, None),
                    PermissionSet::from_iter([PermissionType::Share]),
                    now,
                )),
        )
        .await
        .unwrap();

    let global = store
        .find_tenant_grant(&Subject::GlobalDefault)
        .await
        .unwrap()
        .unwrap();
    assert!(global.permissions.contains(PermissionType::Read));
    assert_eq!(global.subject(), &Subject::GlobalDefault);

    let tenant_default = store
        .find_tenant_grant(&Subject::tenant_default(tenant))
        .await
        .unwrap()
        .unwrap();
    assert!(tenant_default.permissions.contains(PermissionType::Edit));

    let tenantless = store
        .find_tenant_grant(&Subject::user(user, None))
        .await
        .unwrap()
        .unwrap();
    assert!(tenantless.permissions.contains(PermissionType::Share));

    assert!(store
        .find_tenant_grant(&Subject::member(user, tenant))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_live_row_preferred_over_deleted() {
    let store = memory_sqlite_store().await;
    let subject = Subject::tenant_default(TenantId::new());
    let now = Utc::now();

    let mut deleted = Grant::new(subject, PermissionSet::from_iter([PermissionType::Admin]), now);
    deleted.soft_delete(now + Duration::seconds(10));
    let live = Grant::new(subject, PermissionSet::from_iter([PermissionType::Read]), now);

    store
        .commit(ChangeSet::new().tenant(deleted).tenant(live.clone()))
        .await
        .unwrap();

    let found = store.find_tenant_grant(&subject).await.unwrap().unwrap();
    assert_eq!(found.id, live.id);
}

#[tokio::test]
async fn test_content_type_and_resource_rows() {
    let store = memory_sqlite_store().await;
    let subject = Subject::member(UserId::new(), TenantId::new());
    let doc = uuid::Uuid::new_v4();
    let now = Utc::now();

    let content_type = Grant::new(
        ContentTypeScope::new(subject, "article"),
        PermissionSet::from_iter([PermissionType::Publish]),
        now,
    );
    let resource = Grant::new(
        ResourceScope::of::<Document>(subject, &doc),
        PermissionSet::from_iter([PermissionType::Export]),
        now,
    );
    store
        .commit(
            ChangeSet::new()
                .content_type(content_type.clone())
                .resource(resource.clone()),
        )
        .await
        .unwrap();

    assert_eq!(
        store
            .find_content_type_grant(&ContentTypeScope::new(subject, "article"))
            .await
            .unwrap(),
        Some(content_type)
    );
    assert!(store
        .find_content_type_grant(&ContentTypeScope::new(subject, "page"))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        store
            .find_resource_grant(&ResourceScope::of::<Document>(subject, &doc))
            .await
            .unwrap(),
        Some(resource)
    );
}

#[tokio::test]
async fn test_bulk_grant_is_atomic() {
    let store = Arc::new(memory_sqlite_store().await);
    let service = service_over(store.clone(), Arc::new(SystemClock));
    let tenant = TenantId::new();
    let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());

    let before_u1 = service
        .grant(Subject::member(u1, tenant), &[PermissionType::Read])
        .await
        .unwrap();
    let before_u3 = service
        .grant(Subject::member(u3, tenant), &[PermissionType::Read])
        .await
        .unwrap();

    // u2 is the only new row, written after the updates of u1 and u3
    sqlx::query(&format!(
        "CREATE TRIGGER fail_u2 BEFORE INSERT ON tenant_grants \
         WHEN NEW.user_id = '{}' \
         BEGIN SELECT RAISE(ABORT, 'forced failure'); END",
        u2
    ))
    .execute(store.pool())
    .await
    .unwrap();

    let err = service
        .bulk_grant(&[u1, u2, u3], tenant, &[PermissionType::Edit])
        .await
        .unwrap_err();
    assert!(err.is_recoverable());

    let after_u1 = store
        .find_tenant_grant(&Subject::member(u1, tenant))
        .await
        .unwrap()
        .unwrap();
    let after_u3 = store
        .find_tenant_grant(&Subject::member(u3, tenant))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after_u1, before_u1);
    assert_eq!(after_u3, before_u3);
    assert!(store
        .find_tenant_grant(&Subject::member(u2, tenant))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_bulk_lookup_returns_current_row_per_user() {
    let store = memory_sqlite_store().await;
    let tenant = TenantId::new();
    let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());
    let now = Utc::now();

    let mut old = Grant::new(Subject::member(u1, tenant), PermissionSet::empty(), now);
    old.soft_delete(now);
    let current = Grant::new(
        Subject::member(u1, tenant),
        PermissionSet::from_iter([PermissionType::Read]),
        now,
    );
    let other = Grant::new(
        Subject::member(u2, tenant),
        PermissionSet::from_iter([PermissionType::Read]),
        now,
    );
    store
        .commit(ChangeSet::new().tenant(old).tenant(current.clone()).tenant(other.clone()))
        .await
        .unwrap();

    let mut found = store
        .find_tenant_grants_for_users(&[u1, u2, u3], tenant)
        .await
        .unwrap();
    found.sort_by_key(|g| g.subject().user_id());
    let mut expected = vec![current, other];
    expected.sort_by_key(|g| g.subject().user_id());
    assert_eq!(found, expected);
}

#[tokio::test]
async fn test_service_over_sqlite_file_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("grants.db").display());
    let (user, tenant) = (UserId::new(), TenantId::new());

    {
        let store = Arc::new(SqliteGrantStore::from_url(&url).await.unwrap());
        let service = service_over(store.clone(), Arc::new(ManualClock::default()));
        service.join(user, tenant).await.unwrap();
        service
            .grant(Subject::member(user, tenant), &[PermissionType::Comment])
            .await
            .unwrap();
        store.pool().close().await;
    }

    let store = Arc::new(SqliteGrantStore::from_url(&url).await.unwrap());
    let service = service_over(store, Arc::new(SystemClock));
    assert!(service.is_member(user, tenant).await.unwrap());
    assert!(service
        .has_permission(Some(user), Some(tenant), PermissionType::Comment)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_bulk_lookup_beyond_bound_parameter_limit() {
    let store = memory_sqlite_store().await;
    let tenant = TenantId::new();
    let users: Vec<UserId> = (0..33_000).map(|_| UserId::new()).collect();
    let now = Utc::now();

    let mut changes = ChangeSet::new();
    for index in [0, 499, 500, 32_999] {
        changes = changes.tenant(Grant::new(
            Subject::member(users[index], tenant),
            PermissionSet::from_iter([PermissionType::Read]),
            now,
        ));
    }
    store.commit(changes).await.unwrap();

    let found = store
        .find_tenant_grants_for_users(&users, tenant)
        .await
        .unwrap();
    let mut found_users: Vec<UserId> = found
        .iter()
        .filter_map(|g| g.subject().user_id())
        .collect();
    found_users.sort();
    let mut expected = vec![users[0], users[499], users[500], users[32_999]];
    expected.sort();
    assert_eq!(found_users, expected);
}

#[tokio::test]
async fn test_bulk_grant_spanning_several_lookups() {
    let store = Arc::new(memory_sqlite_store().await);
    let service = service_over(store.clone(), Arc::new(SystemClock));
    let tenant = TenantId::new();
    let users: Vec<UserId> = (0..1_200).map(|_| UserId::new()).collect();

    let existing = service
        .grant(Subject::member(users[1_100], tenant), &[PermissionType::Read])
        .await
        .unwrap();

    let grants = service
        .bulk_grant(&users, tenant, &[PermissionType::Comment])
        .await
        .unwrap();
    assert_eq!(grants.len(), 1_200);
    assert_eq!(grants[1_100].id, existing.id);
    assert!(grants[1_100].permissions.contains(PermissionType::Read));

    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenant_grants")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(rows, 1_200);
}
