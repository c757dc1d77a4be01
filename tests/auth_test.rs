mod common;

use anyhow::Result;
use chrono::Duration;
use common::{new_user, register, seed_admin, test_service, ADMIN_EMAIL, TEST_PASSWORD};
use microloan::application::{AppError, LoanService, ServiceSettings};
use microloan::domain::{Role, User};
use microloan::Repository;

#[tokio::test]
async fn test_signup_then_login() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let signup = register(&service, "Asha Rao", "Asha@Example.com").await?;
    assert_eq!(signup.user.email, "asha@example.com");
    assert_eq!(signup.user.role, Role::User);
    assert!(!signup.token.is_empty());

    let login = service.login("ASHA@example.com", TEST_PASSWORD).await?;
    assert_eq!(login.user.id, signup.user.id);

    let me = service.authenticate(&login.token).await?;
    assert_eq!(me.id, signup.user.id);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, "Asha", "asha@example.com").await?;

    let again = register(&service, "Other Asha", "ASHA@example.com").await;
    let err = again.unwrap_err().downcast::<AppError>()?;
    assert!(matches!(err, AppError::EmailAlreadyRegistered(_)));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_signups_with_one_email() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let (first, second) = tokio::join!(
        service.register_user(new_user("Asha", "asha@example.com")),
        service.register_user(new_user("Asha Rao", "ASHA@example.com")),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::EmailAlreadyRegistered(_)))));
    assert_eq!(service.list_users().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_repository_reports_taken_email() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let db_path = temp.path().join("test.db");
    let repo = Repository::init(&format!("sqlite:{}?mode=rwc", db_path.display())).await?;

    let asha = User::new("Asha", "asha@example.com", "9876543210", Role::User, "x".into());
    let twin = User::new("Asha", "asha@example.com", "9876543210", Role::User, "y".into());
    assert!(repo.save_user(&asha).await?);
    assert!(!repo.save_user(&twin).await?);
    assert!(repo.get_user(twin.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_signup_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;

    for weak in ["short1!", "alllower1!", "ALLUPPER1!", "NoDigits!!", "NoSpecial12"] {
        let mut form = new_user("Asha", "asha@example.com");
        form.password = weak.to_string();
        assert!(
            matches!(service.register_user(form).await, Err(AppError::Validation(_))),
            "password {} should be rejected",
            weak
        );
    }

    for phone in ["12345", "98765432101", "98765abcde"] {
        let mut form = new_user("Asha", "asha@example.com");
        form.phone = phone.to_string();
        assert!(matches!(
            service.register_user(form).await,
            Err(AppError::Validation(_))
        ));
    }

    let mut form = new_user("Asha", "not-an-email");
    assert!(service.register_user(form.clone()).await.is_err());
    form.email = "asha@example.com".to_string();
    form.name = "   ".to_string();
    assert!(service.register_user(form).await.is_err());

    assert!(service.list_users().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_login_failures_look_alike() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, "Asha", "asha@example.com").await?;

    let wrong_password = service.login("asha@example.com", "Wr0ng!pass").await;
    let unknown_email = service.login("nobody@example.com", TEST_PASSWORD).await;

    assert!(matches!(wrong_password, Err(AppError::InvalidCredentials)));
    assert!(matches!(unknown_email, Err(AppError::InvalidCredentials)));
    assert!(matches!(
        service.login("", "").await,
        Err(AppError::Validation(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_tokens_are_bound_to_secret() -> Result<()> {
    let (service, temp) = test_service().await?;
    let session = register(&service, "Asha", "asha@example.com").await?;

    let db_path = temp.path().join("test.db");
    let other = LoanService::connect(
        db_path.to_str().unwrap(),
        ServiceSettings::new("another-secret", Duration::hours(1))?,
    )
    .await?;
    assert!(matches!(
        other.authenticate(&session.token).await,
        Err(AppError::Unauthorized(_))
    ));

    let mut tampered = session.token.clone();
    tampered.push('0');
    assert!(matches!(
        service.authenticate(&tampered).await,
        Err(AppError::Unauthorized(_))
    ));
    assert!(matches!(
        service.authenticate("garbage").await,
        Err(AppError::Unauthorized(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_expired_token_is_rejected() -> Result<()> {
    let temp = tempfile::TempDir::new()?;
    let db_path = temp.path().join("test.db");
    let service = LoanService::init(
        db_path.to_str().unwrap(),
        ServiceSettings::new("test-secret", Duration::seconds(-1))?,
    )
    .await?;

    let session = register(&service, "Asha", "asha@example.com").await?;
    assert!(matches!(
        service.authenticate(&session.token).await,
        Err(AppError::Unauthorized(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_profile_update() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = register(&service, "Asha", "asha@example.com").await?;

    let updated = service
        .update_profile(
            session.user.id,
            Some("Asha Rao".into()),
            Some("9123456780".into()),
            Some("abcde1234f".into()),
        )
        .await?;
    assert_eq!(updated.name, "Asha Rao");
    assert_eq!(updated.phone, "9123456780");
    assert_eq!(updated.pan.as_deref(), Some("ABCDE1234F"));
    assert_eq!(updated.email, "asha@example.com");

    // untouched fields are kept
    let renamed = service
        .update_profile(session.user.id, Some("A. Rao".into()), None, None)
        .await?;
    assert_eq!(renamed.phone, "9123456780");
    assert_eq!(renamed.pan.as_deref(), Some("ABCDE1234F"));

    assert!(matches!(
        service
            .update_profile(session.user.id, None, Some("123".into()), None)
            .await,
        Err(AppError::Validation(_))
    ));

    // password still works after the update
    service.login("asha@example.com", TEST_PASSWORD).await?;
    Ok(())
}

#[tokio::test]
async fn test_admin_seed_is_idempotent() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let first = service.ensure_admin(ADMIN_EMAIL, TEST_PASSWORD).await?;
    assert!(first.created);
    assert_eq!(first.admin.role, Role::Admin);

    let second = service.ensure_admin(ADMIN_EMAIL, "Different1!").await?;
    assert!(!second.created);
    assert_eq!(second.admin.id, first.admin.id);

    // admins are not counted as borrowers
    assert!(service.list_users().await?.is_empty());

    let login = service.login(ADMIN_EMAIL, TEST_PASSWORD).await?;
    assert!(login.user.is_admin());

    Ok(())
}

#[tokio::test]
async fn test_admin_seed_refuses_borrower_email() -> Result<()> {
    let (service, _temp) = test_service().await?;
    register(&service, "Asha", "asha@example.com").await?;

    assert!(matches!(
        service.ensure_admin("asha@example.com", TEST_PASSWORD).await,
        Err(AppError::EmailAlreadyRegistered(_))
    ));
    seed_admin(&service).await?;
    Ok(())
}

#[tokio::test]
async fn test_password_hash_never_serialized() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let session = register(&service, "Asha", "asha@example.com").await?;

    let json = serde_json::to_value(&session.user)?;
    assert!(json.get("passwordHash").is_none());
    assert!(json.get("password_hash").is_none());
    assert_eq!(json["email"], "asha@example.com");

    Ok(())
}
