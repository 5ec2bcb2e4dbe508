mod helpers;

use doselog::meds::compliance;
use doselog::meds::types::ComplianceLogEntry;
use doselog::meds::DateRange;

use helpers::{at, test_service};

#[test]
fn recalc_fills_offsets_for_imported_entries() {
    let svc = test_service(&["Metformin 500mg bid"]);
    compliance::append(
        svc.store(),
        vec![
            ComplianceLogEntry::new("metformin", at(2, 28, 20), 500),
            ComplianceLogEntry::new("metformin", at(3, 1, 8), 500),
            ComplianceLogEntry::new("metformin", at(3, 1, 23), 500),
        ],
    )
    .unwrap();

    let summary = svc
        .recalculate(Some("2026-02"), Some("2026-03"), at(3, 2, 0))
        .unwrap();
    assert_eq!(summary.months_scanned, 2);
    assert_eq!(summary.entries_updated, 3);

    let entries = compliance::get(svc.store(), &DateRange::around(at(3, 1, 0), 1)).unwrap();
    assert_eq!(entries.len(), 3);
    assert!((entries[0].dose_offset.unwrap() - 0.25).abs() < 1e-9);
    assert!(entries[1].dose_offset.unwrap().abs() < 1e-9);
    assert!(entries[2].dose_offset.is_none());
}

#[test]
fn recalc_is_stable_when_repeated() {
    let svc = test_service(&["Atorvastatin 10mg qd"]);
    svc.take("atorvastatin", None, Some(at(3, 1, 8)), at(3, 1, 8))
        .unwrap();
    svc.take("atorvastatin", None, Some(at(3, 2, 10)), at(3, 2, 10))
        .unwrap();

    let range = DateRange::around(at(3, 1, 0), 1);
    let before = compliance::get(svc.store(), &range).unwrap();
    svc.recalculate(Some("2026-03"), Some("2026-03"), at(3, 3, 0))
        .unwrap();
    let after = compliance::get(svc.store(), &range).unwrap();
    assert_eq!(before, after);
}

#[test]
fn recalc_rejects_bad_month() {
    let svc = test_service(&[]);
    assert!(svc.recalculate(Some("2026-13"), None, at(3, 1, 0)).is_err());
}
