//! E2E tests: resolving provider profiles to local identities.

use imagine_lib::config::NO_PUBLIC_EMAIL;
use imagine_lib::db::users;
use imagine_lib::services::{IdentityResolver, ResolutionError};

use super::test_helpers::*;

/// (1) First login creates an identity; the second resolves to the same one.
#[actix_rt::test]
async fn test_first_login_creates_then_reuses_identity() {
    let pool = create_test_pool().await;
    let resolver = IdentityResolver::new(pool.clone());
    let profile = github_profile("583231", "octocat", Some("octocat@github.com"));

    let first = resolver.resolve(&profile).await.unwrap();
    let second = resolver.resolve(&profile).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.email, "octocat@github.com");
    assert_eq!(users::count(pool.connection()).await.unwrap(), 1);
}

/// (2) Two concurrent first-time logins create exactly one identity.
#[actix_rt::test]
async fn test_concurrent_first_logins_create_one_identity() {
    let pool = create_test_pool().await;
    let resolver = IdentityResolver::new(pool.clone());
    let profile = google_profile("118034", "Ada", Some("ada@example.com"));

    let (a, b) = tokio::join!(resolver.resolve(&profile), resolver.resolve(&profile));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.id, b.id);
    assert_eq!(users::count(pool.connection()).await.unwrap(), 1);
}

/// (3) Missing email falls back to the placeholder, and placeholders never conflict.
#[actix_rt::test]
async fn test_missing_email_uses_placeholder() {
    let pool = create_test_pool().await;
    let resolver = IdentityResolver::new(pool.clone());

    let one = resolver
        .resolve(&github_profile("1", "private-one", None))
        .await
        .unwrap();
    let two = resolver
        .resolve(&github_profile("2", "private-two", None))
        .await
        .unwrap();

    assert_eq!(one.email, NO_PUBLIC_EMAIL);
    assert_eq!(two.email, NO_PUBLIC_EMAIL);
    assert_ne!(one.id, two.id);
}

/// (4) Repeat login refreshes display name and avatar but keeps the stored email.
#[actix_rt::test]
async fn test_repeat_login_refreshes_profile() {
    let pool = create_test_pool().await;
    let resolver = IdentityResolver::new(pool.clone());

    let original = resolver
        .resolve(&github_profile("42", "old-login", Some("first@example.com")))
        .await
        .unwrap();

    let mut renamed = github_profile("42", "new-login", Some("second@example.com"));
    renamed.avatar_url = Some("https://avatars.example/new".to_string());
    let refreshed = resolver.resolve(&renamed).await.unwrap();

    assert_eq!(refreshed.id, original.id);
    assert_eq!(refreshed.display_name, "new-login");
    assert_eq!(
        refreshed.avatar_url.as_deref(),
        Some("https://avatars.example/new")
    );
    assert_eq!(refreshed.email, "first@example.com");
    assert!(refreshed.last_login_at.is_some());
}

/// (5) The same email from a different provider identity is a conflict, not a merge.
#[actix_rt::test]
async fn test_email_owned_by_other_identity_conflicts() {
    let pool = create_test_pool().await;
    let resolver = IdentityResolver::new(pool.clone());

    resolver
        .resolve(&google_profile("g-1", "Grace", Some("grace@example.com")))
        .await
        .unwrap();

    let err = resolver
        .resolve(&github_profile("gh-1", "grace", Some("grace@example.com")))
        .await
        .unwrap_err();

    match err {
        ResolutionError::EmailConflict { email } => assert_eq!(email, "grace@example.com"),
        other => panic!("expected EmailConflict, got {:?}", other),
    }
    assert_eq!(users::count(pool.connection()).await.unwrap(), 1);
}

/// (6) Provider identities are scoped: the same external id on two providers is two users.
#[actix_rt::test]
async fn test_external_ids_are_provider_scoped() {
    let pool = create_test_pool().await;
    let resolver = IdentityResolver::new(pool.clone());

    let google = resolver
        .resolve(&google_profile("777", "Lin", None))
        .await
        .unwrap();
    let github = resolver
        .resolve(&github_profile("777", "lin", None))
        .await
        .unwrap();

    assert_ne!(google.id, github.id);
    assert_eq!(users::count(pool.connection()).await.unwrap(), 2);
}

/// (7) An unavailable store aborts resolution with a store error.
#[actix_rt::test]
async fn test_unavailable_store_is_store_error() {
    let pool = create_test_pool().await;
    let resolver = IdentityResolver::new(pool.clone());
    break_identity_store(&pool).await;

    let err = resolver
        .resolve(&github_profile("404", "nobody", Some("nobody@example.com")))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::Store(_)), "got {:?}", err);
}
