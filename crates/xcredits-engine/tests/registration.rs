//! Registration lifecycle and verification code tests.

mod common;

use chrono::Duration;
use common::Harness;
use xcredits_core::{CreditsError, PageRequest, RegistrationStatus, VerificationPurpose};

#[test]
fn application_flows_to_registered_with_an_account() {
    let h = Harness::new();
    let regs = &h.engines.registrations;

    let applied = regs
        .apply("Alice@Example.com", "alice", "correct horse")
        .unwrap();
    assert_eq!(applied.email, "alice@example.com");
    assert_eq!(applied.status, RegistrationStatus::Pending);
    assert!(applied.password_matches("correct horse"));
    assert_eq!(regs.list_pending(PageRequest::new(1, 10)).unwrap().total, 1);

    let token = applied.token.clone().unwrap();
    let verified = regs.verify(&token).unwrap();
    assert_eq!(verified.status, RegistrationStatus::Verified);
    assert!(verified.token.is_none());
    assert_eq!(regs.list_pending(PageRequest::new(1, 10)).unwrap().total, 0);

    let approved = regs.approve(&applied.id).unwrap();
    assert_eq!(approved.status, RegistrationStatus::Registered);
    let user_id = approved.user_id.unwrap();
    assert_eq!(h.engines.ledger.balance(&user_id).unwrap().balance, 0);
}

#[test]
fn registered_applications_never_move_backwards() {
    let h = Harness::new();
    let regs = &h.engines.registrations;

    let applied = regs.apply("bob@example.com", "bob", "hunter22").unwrap();
    let token = applied.token.clone().unwrap();
    regs.verify(&token).unwrap();
    regs.approve(&applied.id).unwrap();

    assert!(matches!(
        regs.reject(&applied.id),
        Err(CreditsError::InvalidState { .. })
    ));
    assert!(matches!(
        regs.approve(&applied.id),
        Err(CreditsError::InvalidState { .. })
    ));
    assert!(matches!(regs.verify(&token), Err(CreditsError::NotFound { .. })));

    let registered = regs
        .list_by_status(RegistrationStatus::Registered, PageRequest::new(1, 10))
        .unwrap();
    assert_eq!(registered.total, 1);
}

#[test]
fn approve_requires_verification() {
    let h = Harness::new();
    let regs = &h.engines.registrations;
    let applied = regs.apply("carol@example.com", "carol", "secret1").unwrap();

    assert!(matches!(
        regs.approve(&applied.id),
        Err(CreditsError::InvalidState { .. })
    ));

    let rejected = regs.reject(&applied.id).unwrap();
    assert_eq!(rejected.status, RegistrationStatus::Rejected);
    assert!(matches!(
        regs.reject(&applied.id),
        Err(CreditsError::InvalidState { .. })
    ));
}

#[test]
fn taken_email_or_username_is_rejected_until_stale() {
    let h = Harness::new();
    let regs = &h.engines.registrations;
    let first = regs.apply("dave@example.com", "dave", "secret1").unwrap();

    assert!(matches!(
        regs.apply("DAVE@example.com", "dave2", "secret1"),
        Err(CreditsError::AlreadyExists { .. })
    ));
    assert!(matches!(
        regs.apply("other@example.com", "dave", "secret1"),
        Err(CreditsError::AlreadyExists { .. })
    ));

    regs.reject(&first.id).unwrap();
    let second = regs.apply("dave@example.com", "dave", "secret1").unwrap();
    assert_ne!(second.id, first.id);

    // An unverified application past its deadline frees its keys too.
    h.clock.advance(Duration::hours(25));
    let third = regs.apply("dave@example.com", "dave", "secret1").unwrap();
    assert_ne!(third.id, second.id);
}

#[test]
fn expired_token_cannot_verify() {
    let h = Harness::new();
    let regs = &h.engines.registrations;
    let applied = regs.apply("erin@example.com", "erin", "secret1").unwrap();

    h.clock.advance(Duration::hours(25));
    assert!(matches!(
        regs.verify(applied.token.as_deref().unwrap()),
        Err(CreditsError::Expired { .. })
    ));
    assert!(matches!(
        regs.verify("no-such-token"),
        Err(CreditsError::NotFound { .. })
    ));
}

#[test]
fn malformed_applications_are_invalid() {
    let h = Harness::new();
    let regs = &h.engines.registrations;

    for (email, username, password) in [
        ("not-an-email", "frank", "secret1"),
        ("frank@example.com", "fr", "secret1"),
        ("frank@example.com", "frank smith", "secret1"),
        ("frank@example.com", "frank", "short"),
    ] {
        assert!(
            matches!(
                regs.apply(email, username, password),
                Err(CreditsError::InvalidInput(_))
            ),
            "{email} {username} {password}"
        );
    }
}

#[test]
fn verification_codes_are_single_use() {
    let h = Harness::new();
    let regs = &h.engines.registrations;
    let issued = regs
        .issue_code("gina@example.com", VerificationPurpose::Register)
        .unwrap();

    assert!(matches!(
        regs.consume_code("gina@example.com", VerificationPurpose::ResetPassword, &issued.code),
        Err(CreditsError::NotFound { .. })
    ));

    let wrong = if issued.code == "000000" { "111111" } else { "000000" };
    assert!(matches!(
        regs.consume_code("gina@example.com", VerificationPurpose::Register, wrong),
        Err(CreditsError::InvalidInput(_))
    ));

    regs.consume_code("Gina@Example.com", VerificationPurpose::Register, &issued.code)
        .unwrap();
    assert!(matches!(
        regs.consume_code("gina@example.com", VerificationPurpose::Register, &issued.code),
        Err(CreditsError::NotFound { .. })
    ));
}

#[test]
fn reissuing_a_code_replaces_the_old_one() {
    let h = Harness::new();
    let regs = &h.engines.registrations;
    let first = regs
        .issue_code("hank@example.com", VerificationPurpose::Register)
        .unwrap();
    let second = regs
        .issue_code("hank@example.com", VerificationPurpose::Register)
        .unwrap();

    if first.code != second.code {
        assert!(matches!(
            regs.consume_code("hank@example.com", VerificationPurpose::Register, &first.code),
            Err(CreditsError::InvalidInput(_))
        ));
    }
    regs.consume_code("hank@example.com", VerificationPurpose::Register, &second.code)
        .unwrap();
}

#[test]
fn purge_removes_expired_pending_and_codes() {
    let h = Harness::new();
    let regs = &h.engines.registrations;
    regs.apply("ivy@example.com", "ivy", "secret1").unwrap();
    let kept = regs.apply("jay@example.com", "jay", "secret1").unwrap();
    regs.verify(kept.token.as_deref().unwrap()).unwrap();
    let code = regs
        .issue_code("ivy@example.com", VerificationPurpose::Register)
        .unwrap();

    h.clock.advance(Duration::hours(25));
    let report = regs.purge_expired().unwrap();
    assert_eq!(report.registrations, 1);
    assert_eq!(report.verification_codes, 1);

    assert!(matches!(
        regs.consume_code("ivy@example.com", VerificationPurpose::Register, &code.code),
        Err(CreditsError::NotFound { .. })
    ));
    let verified = regs
        .list_by_status(RegistrationStatus::Verified, PageRequest::new(1, 10))
        .unwrap();
    assert_eq!(verified.total, 1);
}
