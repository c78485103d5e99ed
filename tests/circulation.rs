use chrono::NaiveDate;
use library_circulation::*;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn library_on(date: NaiveDate) -> Library {
    Library::with_clock(
        open_memory().unwrap(),
        LoanPolicy::default(),
        Box::new(FixedClock::on(date)),
    )
}

/// Two copies of Dune and one registered reader, on March 1st.
fn seeded() -> Library {
    let mut library = library_on(day(1));
    library
        .add_new_book("Dune", Some("Frank Herbert"), Some("Fiction"), 2)
        .unwrap();
    library
        .register_user("alice", "Alice Smith", Some("10"), Some("B"))
        .unwrap();
    library
}

fn available(library: &Library, title: &str) -> i64 {
    library.find_book(title).unwrap().unwrap().available_copies
}

#[test]
fn borrow_and_return_on_time() {
    let mut library = seeded();

    let receipt = library.borrow_book("alice", "Dune").unwrap();
    assert_eq!(receipt.due_date, day(8));
    assert_eq!(available(&library, "Dune"), 1);

    library.set_clock(Box::new(FixedClock::on(day(8))));
    let returned = library.return_book("alice", "Dune").unwrap();
    assert_eq!(returned.days_overdue, 0);
    assert_eq!(returned.fine_amount, 0.0);
    assert_eq!(available(&library, "Dune"), 2);

    let summary = &library.list_all_users().unwrap()[0];
    assert_eq!(summary.active_loans, 0);
}

#[test]
fn late_return_charges_fine_per_day() {
    let mut library = seeded();
    library.borrow_book("alice", "Dune").unwrap();

    library.set_clock(Box::new(FixedClock::on(day(11))));
    let returned = library.return_book("alice", "Dune").unwrap();
    assert_eq!(returned.days_overdue, 3);
    assert_eq!(returned.fine_amount, 15.0);

    let log = library.borrow_logs().unwrap();
    assert_eq!(log.total_fines, 15.0);
    assert_eq!(log.entries[0].status, LoanStatus::Returned);
}

#[test]
fn missing_user_is_reported_before_missing_book() {
    let mut library = seeded();
    let err = library.borrow_book("ghost", "Nowhere").unwrap_err();
    assert!(matches!(err, LibraryError::NotRegistered(ref name) if name == "ghost"));
    assert!(err.is_not_registered());

    let err = library.borrow_book("alice", "Nowhere").unwrap_err();
    assert!(matches!(err, LibraryError::BookNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn suspended_user_cannot_borrow_or_return() {
    let mut library = seeded();
    library.borrow_book("alice", "Dune").unwrap();
    library
        .set_user_status("alice", UserStatus::Suspended)
        .unwrap();

    let err = library.borrow_book("alice", "Dune").unwrap_err();
    assert!(matches!(
        err,
        LibraryError::UserNotActive {
            status: UserStatus::Suspended,
            ..
        }
    ));
    assert!(err.is_not_registered());
    assert!(matches!(
        library.return_book("alice", "Dune").unwrap_err(),
        LibraryError::UserNotActive { .. }
    ));
    assert!(library.check_user_exists("alice").unwrap().is_none());
    assert!(library.find_user("alice").unwrap().is_some());
}

#[test]
fn last_copy_and_duplicate_holds_are_refused() {
    let mut library = seeded();
    library.add_new_book("Solo", None, None, 1).unwrap();
    library.register_user("bob", "Bob Jones", None, None).unwrap();

    library.borrow_book("bob", "Solo").unwrap();
    assert!(matches!(
        library.borrow_book("alice", "Solo").unwrap_err(),
        LibraryError::NoCopiesAvailable(_)
    ));

    library.borrow_book("alice", "Dune").unwrap();
    let err = library.borrow_book("alice", "Dune").unwrap_err();
    assert!(matches!(err, LibraryError::AlreadyHeld { .. }));
    assert_eq!(available(&library, "Dune"), 1);
}

#[test]
fn borrowing_limit_is_three() {
    let mut library = seeded();
    for title in ["A", "B", "C", "D"] {
        library.add_new_book(title, None, None, 1).unwrap();
    }
    for title in ["A", "B", "C"] {
        library.borrow_book("alice", title).unwrap();
    }

    let err = library.borrow_book("alice", "D").unwrap_err();
    assert!(matches!(err, LibraryError::LimitExceeded { limit: 3, .. }));
    assert_eq!(available(&library, "D"), 1);
}

#[test]
fn policy_controls_period_fine_and_limit() {
    let policy = LoanPolicy {
        loan_days: 14,
        daily_fine: 1.5,
        max_active_loans: 1,
    };
    let mut library =
        Library::with_clock(open_memory().unwrap(), policy, Box::new(FixedClock::on(day(1))));
    library.add_new_book("Dune", None, None, 1).unwrap();
    library.add_new_book("Emma", None, None, 1).unwrap();
    library.register_user("alice", "Alice Smith", None, None).unwrap();

    let receipt = library.borrow_book("alice", "Dune").unwrap();
    assert_eq!(receipt.due_date, day(15));
    assert!(matches!(
        library.borrow_book("alice", "Emma").unwrap_err(),
        LibraryError::LimitExceeded { limit: 1, .. }
    ));

    library.set_clock(Box::new(FixedClock::on(day(17))));
    assert_eq!(library.return_book("alice", "Dune").unwrap().fine_amount, 3.0);
}

#[test]
fn renew_extends_from_previous_due_date() {
    let mut library = seeded();
    library.borrow_book("alice", "Dune").unwrap();

    library.set_clock(Box::new(FixedClock::on(day(5))));
    let renewed = library.renew_book("alice", "Dune").unwrap();
    assert_eq!(renewed.previous_due_date, day(8));
    assert_eq!(renewed.new_due_date, day(15));

    library.set_clock(Box::new(FixedClock::on(day(15))));
    let renewed = library.renew_book("alice", "Dune").unwrap();
    assert_eq!(renewed.new_due_date, day(22));
}

#[test]
fn overdue_loan_cannot_be_renewed() {
    let mut library = seeded();
    library.borrow_book("alice", "Dune").unwrap();

    library.set_clock(Box::new(FixedClock::on(day(9))));
    let err = library.renew_book("alice", "Dune").unwrap_err();
    assert!(matches!(err, LibraryError::Overdue { due_date, .. } if due_date == day(8)));
    assert_eq!(library.track_books().unwrap()[0].due_date, day(8));
}

#[test]
fn return_requires_an_open_loan() {
    let mut library = seeded();
    assert!(matches!(
        library.return_book("alice", "Dune").unwrap_err(),
        LibraryError::NoActiveLoan { .. }
    ));
    assert!(matches!(
        library.return_book("alice", "Nowhere").unwrap_err(),
        LibraryError::BookNotFound(_)
    ));
    assert!(matches!(
        library.renew_book("alice", "Dune").unwrap_err(),
        LibraryError::NoActiveLoan { .. }
    ));

    library.borrow_book("alice", "Dune").unwrap();
    library.return_book("alice", "Dune").unwrap();
    assert!(matches!(
        library.return_book("alice", "Dune").unwrap_err(),
        LibraryError::NoActiveLoan { .. }
    ));
    assert_eq!(available(&library, "Dune"), 2);
}

#[test]
fn reborrowing_after_return_is_allowed() {
    let mut library = seeded();
    library.borrow_book("alice", "Dune").unwrap();
    library.return_book("alice", "Dune").unwrap();
    library.borrow_book("alice", "Dune").unwrap();

    assert_eq!(library.user_history("alice").unwrap().entries.len(), 2);
    assert_eq!(available(&library, "Dune"), 1);
}

#[test]
fn failed_loan_insert_leaves_copies_untouched() {
    let mut library = seeded();
    library
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_loans BEFORE INSERT ON borrowed_books
             BEGIN SELECT RAISE(ABORT, 'loan table locked'); END;",
        )
        .unwrap();

    let err = library.borrow_book("alice", "Dune").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(available(&library, "Dune"), 2);
    assert!(library.track_books().unwrap().is_empty());

    library
        .connection()
        .execute_batch("DROP TRIGGER reject_loans;")
        .unwrap();
    library.borrow_book("alice", "Dune").unwrap();
    assert_eq!(available(&library, "Dune"), 1);
}

#[test]
fn failed_copy_restore_keeps_loan_open() {
    let mut library = seeded();
    library.borrow_book("alice", "Dune").unwrap();
    library
        .connection()
        .execute_batch(
            "CREATE TRIGGER freeze_books BEFORE UPDATE ON books
             BEGIN SELECT RAISE(ABORT, 'books table locked'); END;",
        )
        .unwrap();

    library.set_clock(Box::new(FixedClock::on(day(10))));
    let err = library.return_book("alice", "Dune").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(available(&library, "Dune"), 1);

    let open = library.track_books().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(library.borrow_logs().unwrap().total_fines, 0.0);
}

#[test]
fn unregistered_user_is_reported_before_missing_copies() {
    let mut library = library_on(day(1));
    library.add_new_book("Dune", None, None, 1).unwrap();
    library
        .register_user("alice", "Alice Smith", None, None)
        .unwrap();
    library.borrow_book("alice", "Dune").unwrap();

    let err = library.borrow_book("bob", "Dune").unwrap_err();
    assert!(matches!(err, LibraryError::NotRegistered(ref name) if name == "bob"));
    assert_eq!(available(&library, "Dune"), 0);
}
