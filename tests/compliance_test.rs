mod helpers;

use chrono::NaiveDate;
use doselog::meds::compliance::{self, SetOutcome};
use doselog::meds::types::ComplianceLogEntry;
use doselog::meds::{DateRange, MedError};
use uuid::Uuid;

use helpers::{at, test_service};

fn day(month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, month, d).unwrap()
}

#[test]
fn undo_posted_twice_leaves_same_state() {
    let svc = test_service(&["Metformin 500mg bid"]);
    let kept = svc.take("metformin", None, Some(at(3, 10, 8)), at(3, 10, 8)).unwrap();
    let dropped = svc.take("metformin", None, Some(at(3, 10, 20)), at(3, 10, 20)).unwrap();

    let undo = ComplianceLogEntry::undo(dropped.uuid.unwrap(), "metformin", at(3, 10, 20));
    assert_eq!(
        svc.post_compliance_log(undo.clone(), at(3, 11, 0)).unwrap(),
        SetOutcome::Deleted
    );
    let once = svc
        .compliance_log(Some(day(3, 1)), Some(day(3, 31)), None, day(3, 31))
        .unwrap();

    assert_eq!(
        svc.post_compliance_log(undo, at(3, 11, 0)).unwrap(),
        SetOutcome::AlreadyAbsent
    );
    let twice = svc
        .compliance_log(Some(day(3, 1)), Some(day(3, 31)), None, day(3, 31))
        .unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.len(), 1);
    assert_eq!(once[0].uuid, kept.uuid);
}

#[test]
fn last_day_of_month_is_visible_from_next_month() {
    let svc = test_service(&["Atorvastatin 10mg qd"]);
    svc.take("atorvastatin", None, Some(at(1, 31, 23)), at(1, 31, 23))
        .unwrap();

    let entries = svc
        .compliance_log(Some(day(2, 1)), Some(day(2, 28)), None, day(2, 28))
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actual.time, at(1, 31, 23));
}

#[test]
fn offsets_cross_month_boundary() {
    let svc = test_service(&["Atorvastatin 10mg qd"]);
    svc.take("atorvastatin", None, Some(at(1, 31, 8)), at(1, 31, 8))
        .unwrap();
    let second = svc
        .take("atorvastatin", None, Some(at(2, 1, 20)), at(2, 1, 20))
        .unwrap();

    assert_eq!(second.expected.unwrap().time, at(2, 1, 8));
    assert!((second.dose_offset.unwrap() - 0.5).abs() < 1e-9);
}

#[test]
fn zero_dose_and_unknown_medication_are_rejected() {
    let svc = test_service(&["Atorvastatin 10mg qd"]);

    let zero = ComplianceLogEntry::new("atorvastatin", at(3, 1, 8), 0);
    assert!(matches!(
        svc.post_compliance_log(zero, at(3, 1, 8)),
        Err(MedError::Validation(_))
    ));

    let unknown = ComplianceLogEntry::new("aspirin", at(3, 1, 8), 81);
    assert!(matches!(
        svc.post_compliance_log(unknown, at(3, 1, 8)),
        Err(MedError::NotFound(_))
    ));
}

#[test]
fn full_name_resolves_to_key() {
    let svc = test_service(&["Metformin ER 500mg bid"]);
    let entry = ComplianceLogEntry::new("Metformin ER", at(3, 1, 8), 500);
    match svc.post_compliance_log(entry, at(3, 1, 8)).unwrap() {
        SetOutcome::Saved(saved) => assert_eq!(saved.med_keyname, "metformin"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn update_with_unknown_uuid_is_not_found() {
    let svc = test_service(&["Atorvastatin 10mg qd"]);
    let mut entry = ComplianceLogEntry::new("atorvastatin", at(3, 1, 8), 10);
    entry.uuid = Some(Uuid::now_v7());
    assert!(matches!(
        svc.post_compliance_log(entry, at(3, 1, 8)),
        Err(MedError::NotFound(_))
    ));
}

#[test]
fn moving_an_entry_across_months_keeps_one_copy() {
    let svc = test_service(&["Atorvastatin 10mg qd"]);
    let mut entry = svc
        .take("atorvastatin", None, Some(at(3, 31, 23)), at(3, 31, 23))
        .unwrap();

    entry.actual.time = at(4, 1, 1);
    let moved = match svc.post_compliance_log(entry, at(4, 1, 2)).unwrap() {
        SetOutcome::Saved(e) => e,
        other => panic!("unexpected {other:?}"),
    };

    let all = compliance::get(svc.store(), &DateRange::new(day(3, 1), day(4, 30))).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].uuid, moved.uuid);
    assert_eq!(all[0].actual.time, at(4, 1, 1));
}

#[test]
fn later_doses_are_remeasured_after_backdated_insert() {
    let svc = test_service(&["Atorvastatin 10mg qd"]);
    svc.take("atorvastatin", None, Some(at(3, 1, 8)), at(3, 1, 8))
        .unwrap();
    svc.take("atorvastatin", None, Some(at(3, 3, 8)), at(3, 3, 8))
        .unwrap();

    // fill in the forgotten dose on the 2nd
    svc.take("atorvastatin", None, Some(at(3, 2, 8)), at(3, 3, 9))
        .unwrap();

    let entries = svc
        .compliance_log(Some(day(3, 1)), Some(day(3, 3)), None, day(3, 3))
        .unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].actual.time, at(3, 3, 8));
    assert!(entries[0].dose_offset.unwrap().abs() < 1e-9);
    assert!(entries[1].dose_offset.unwrap().abs() < 1e-9);
    assert!(entries[2].dose_offset.is_none());
}

#[test]
fn range_over_limit_is_rejected() {
    let svc = test_service(&[]);
    assert!(matches!(
        svc.compliance_log(Some(day(1, 1)), Some(day(12, 31)), None, day(12, 31)),
        Err(MedError::Validation(_))
    ));
}
