//! Membership flow tests against the in-memory SQLite backend.

use std::sync::Arc;

use huddle_core::{CoreError, InviteKind, InviteResolver, MembershipService, NoopSeatSync};
use huddle_storage::{CustomerId, Store, TeamRole};
use huddle_store_sqlite::SqliteStore;
use uuid::Uuid;

async fn setup() -> (Arc<SqliteStore>, MembershipService<SqliteStore, NoopSeatSync>) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let service = MembershipService::new(Arc::clone(&store), Arc::new(NoopSeatSync));
    (store, service)
}

fn customer() -> CustomerId {
    CustomerId(Uuid::new_v4())
}

#[tokio::test]
async fn create_team_bootstraps_owner() {
    let (store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();

    let member = store.get_team_member(&team.id, &alice).await.unwrap();
    assert_eq!(member.role, TeamRole::Owner);
    assert_eq!(store.count_team_owners(&team.id).await.unwrap(), 1);
    assert_eq!(
        store.get_active_team(&alice).await.unwrap(),
        Some(team.id.clone())
    );
}

#[tokio::test]
async fn create_team_rejects_duplicate_slug() {
    let (_store, service) = setup().await;

    service
        .create_team("Acme", "acme", &customer())
        .await
        .unwrap();
    let result = service.create_team("Other Acme", "acme", &customer()).await;

    assert!(matches!(result, Err(CoreError::SlugTaken)));
}

#[tokio::test]
async fn create_team_rejects_invalid_slug() {
    let (_store, service) = setup().await;

    for slug in ["", "Acme", "acme inc", "acme_inc"] {
        let result = service.create_team("Acme", slug, &customer()).await;
        assert!(matches!(result, Err(CoreError::InvalidSlug)), "slug {:?}", slug);
    }
}

#[tokio::test]
async fn add_member_twice_is_rejected() {
    let (_store, service) = setup().await;
    let alice = customer();
    let bob = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    service
        .add_member(&team.id, &bob, TeamRole::Member, Some(alice.clone()))
        .await
        .unwrap();

    let result = service
        .add_member(&team.id, &bob, TeamRole::Admin, Some(alice))
        .await;
    assert!(matches!(result, Err(CoreError::AlreadyMember)));
}

#[tokio::test]
async fn last_owner_cannot_be_removed_until_ownership_transfers() {
    let (store, service) = setup().await;
    let alice = customer();
    let bob = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    service
        .add_member(&team.id, &bob, TeamRole::Member, Some(alice.clone()))
        .await
        .unwrap();

    // removing the only owner is rejected and observably a no-op
    let result = service.remove_member(&team.id, &alice).await;
    assert!(matches!(result, Err(CoreError::LastOwner)));
    let member = store.get_team_member(&team.id, &alice).await.unwrap();
    assert_eq!(member.role, TeamRole::Owner);

    // transfer ownership, then the removal goes through
    service
        .change_role(&team.id, &bob, TeamRole::Owner)
        .await
        .unwrap();
    service.remove_member(&team.id, &alice).await.unwrap();

    let members = store.list_team_members(&team.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].customer_id, bob);
    assert_eq!(members[0].role, TeamRole::Owner);
}

#[tokio::test]
async fn demoting_last_owner_is_rejected() {
    let (store, service) = setup().await;
    let alice = customer();
    let bob = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    service
        .add_member(&team.id, &bob, TeamRole::Admin, Some(alice.clone()))
        .await
        .unwrap();

    let result = service.change_role(&team.id, &alice, TeamRole::Member).await;
    assert!(matches!(result, Err(CoreError::LastOwner)));
    assert_eq!(store.count_team_owners(&team.id).await.unwrap(), 1);

    // with a second owner in place the demotion is allowed
    service
        .change_role(&team.id, &bob, TeamRole::Owner)
        .await
        .unwrap();
    service
        .change_role(&team.id, &alice, TeamRole::Member)
        .await
        .unwrap();
    assert_eq!(store.count_team_owners(&team.id).await.unwrap(), 1);
}

#[tokio::test]
async fn change_role_for_missing_member_is_not_found() {
    let (_store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    let result = service
        .change_role(&team.id, &customer(), TeamRole::Admin)
        .await;
    assert!(matches!(result, Err(CoreError::NotFound)));
}

#[tokio::test]
async fn removing_member_clears_their_active_team() {
    let (store, service) = setup().await;
    let alice = customer();
    let bob = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    service
        .add_member(&team.id, &bob, TeamRole::Member, None)
        .await
        .unwrap();
    assert_eq!(
        store.get_active_team(&bob).await.unwrap(),
        Some(team.id.clone())
    );

    service.remove_member(&team.id, &bob).await.unwrap();
    assert_eq!(store.get_active_team(&bob).await.unwrap(), None);
}

#[tokio::test]
async fn new_email_invite_replaces_outstanding_one() {
    let (store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    let first = service
        .send_email_invite(&team.id, "x@y.com", TeamRole::Admin, &alice)
        .await
        .unwrap();
    let second = service
        .send_email_invite(&team.id, "x@y.com", TeamRole::Member, &alice)
        .await
        .unwrap();
    assert_ne!(first.code, second.code);

    let resolver = InviteResolver::new(Arc::clone(&store));
    let result = resolver.resolve(&team.id, &first.code).await;
    assert!(matches!(result, Err(CoreError::InviteNotFound)));

    let resolved = resolver.resolve(&team.id, &second.code).await.unwrap();
    assert_eq!(resolved.kind, InviteKind::Email);
    assert_eq!(resolved.role, TeamRole::Member);

    assert_eq!(store.list_email_invites(&team.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn send_email_invite_rejects_bad_address() {
    let (_store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    for email in ["", "not-an-email"] {
        let result = service
            .send_email_invite(&team.id, email, TeamRole::Member, &alice)
            .await;
        assert!(matches!(result, Err(CoreError::InvalidEmail)));
    }
}

#[tokio::test]
async fn cancel_email_invite_is_idempotent() {
    let (store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();

    // canceling a code that never existed is not an error
    service
        .cancel_email_invite(&team.id, "no-such-code")
        .await
        .unwrap();

    let invite = service
        .send_email_invite(&team.id, "x@y.com", TeamRole::Member, &alice)
        .await
        .unwrap();
    service
        .cancel_email_invite(&team.id, &invite.code)
        .await
        .unwrap();
    service
        .cancel_email_invite(&team.id, &invite.code)
        .await
        .unwrap();

    let resolver = InviteResolver::new(Arc::clone(&store));
    let result = resolver.resolve(&team.id, &invite.code).await;
    assert!(matches!(result, Err(CoreError::InviteNotFound)));
}

#[tokio::test]
async fn refreshing_shareable_code_invalidates_the_old_one() {
    let (store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    let resolver = InviteResolver::new(Arc::clone(&store));

    let old_code = service.refresh_shareable_invite(&team.id).await.unwrap();
    let resolved = resolver.resolve(&team.id, &old_code).await.unwrap();
    assert_eq!(resolved.kind, InviteKind::Shareable);
    assert_eq!(resolved.role, TeamRole::Member);

    let new_code = service.refresh_shareable_invite(&team.id).await.unwrap();
    assert_ne!(old_code, new_code);

    let result = resolver.resolve(&team.id, &old_code).await;
    assert!(matches!(result, Err(CoreError::InviteNotFound)));
    resolver.resolve(&team.id, &new_code).await.unwrap();

    service.clear_shareable_invite(&team.id).await.unwrap();
    let result = resolver.resolve(&team.id, &new_code).await;
    assert!(matches!(result, Err(CoreError::InviteNotFound)));
}

#[tokio::test]
async fn email_invite_wins_when_codes_collide() {
    let (store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    let invite = service
        .send_email_invite(&team.id, "x@y.com", TeamRole::Admin, &alice)
        .await
        .unwrap();

    // force the shareable code to coincide with the email invite's code
    store
        .set_shareable_invite_code(&team.id, Some(invite.code.clone()))
        .await
        .unwrap();

    let resolver = InviteResolver::new(Arc::clone(&store));
    let resolved = resolver.resolve(&team.id, &invite.code).await.unwrap();
    assert_eq!(resolved.kind, InviteKind::Email);
    assert_eq!(resolved.role, TeamRole::Admin);
}

#[tokio::test]
async fn redeeming_email_invite_consumes_it() {
    let (store, service) = setup().await;
    let alice = customer();
    let bob = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    let invite = service
        .send_email_invite(&team.id, "bob@y.com", TeamRole::Admin, &alice)
        .await
        .unwrap();

    let role = service
        .redeem_invite(&team.id, &invite.code, &bob)
        .await
        .unwrap();
    assert_eq!(role, TeamRole::Admin);

    let member = store.get_team_member(&team.id, &bob).await.unwrap();
    assert_eq!(member.role, TeamRole::Admin);
    assert_eq!(member.invited_by, Some(alice));
    assert_eq!(
        store.get_active_team(&bob).await.unwrap(),
        Some(team.id.clone())
    );

    // single use: the code is gone after acceptance
    let result = service.redeem_invite(&team.id, &invite.code, &customer()).await;
    assert!(matches!(result, Err(CoreError::InviteNotFound)));
}

#[tokio::test]
async fn shareable_code_is_reusable_and_grants_member() {
    let (store, service) = setup().await;
    let alice = customer();
    let bob = customer();
    let carol = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    let code = service.refresh_shareable_invite(&team.id).await.unwrap();

    assert_eq!(
        service.redeem_invite(&team.id, &code, &bob).await.unwrap(),
        TeamRole::Member
    );
    assert_eq!(
        service.redeem_invite(&team.id, &code, &carol).await.unwrap(),
        TeamRole::Member
    );

    assert_eq!(store.count_team_members(&team.id).await.unwrap(), 3);
}

#[tokio::test]
async fn redeeming_unknown_code_is_invite_not_found() {
    let (_store, service) = setup().await;
    let alice = customer();

    let team = service.create_team("Acme", "acme", &alice).await.unwrap();
    let result = service
        .redeem_invite(&team.id, "definitely-wrong", &customer())
        .await;
    assert!(matches!(result, Err(CoreError::InviteNotFound)));
}
