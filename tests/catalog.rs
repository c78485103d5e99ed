use chrono::NaiveDate;
use library_circulation::*;

fn library() -> Library {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    Library::with_clock(
        open_memory().unwrap(),
        LoanPolicy::default(),
        Box::new(FixedClock::on(date)),
    )
}

#[test]
fn adding_an_existing_title_grows_stock() {
    let mut library = library();
    library
        .add_new_book("Dune", Some("Frank Herbert"), Some("Fiction"), 2)
        .unwrap();
    let book = library.add_new_book("Dune", None, None, 3).unwrap();

    assert_eq!(book.total_copies, 5);
    assert_eq!(book.available_copies, 5);
    assert_eq!(book.author.as_deref(), Some("Frank Herbert"));
    assert_eq!(library.list_books().unwrap().len(), 1);
}

#[test]
fn add_rejects_blank_title_and_zero_copies() {
    let mut library = library();
    let err = library.add_new_book("   ", None, None, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = library.add_new_book("Dune", None, None, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(library.list_books().unwrap().is_empty());
}

#[test]
fn donation_adds_one_copy_in_default_category() {
    let mut library = library();
    let book = library.donate_book("Emma", Some("Jane Austen"), None).unwrap();
    assert_eq!(book.total_copies, 1);
    assert_eq!(book.category, "General");

    let book = library.donate_book("Emma", None, Some("  ")).unwrap();
    assert_eq!(book.total_copies, 2);
}

#[test]
fn edit_keeps_borrowed_copies_accounted_for() {
    let mut library = library();
    library.add_new_book("Dune", None, None, 2).unwrap();
    library.register_user("alice", "Alice Smith", None, None).unwrap();
    library.borrow_book("alice", "Dune").unwrap();

    let err = library
        .edit_book("Dune", "Dune Messiah", Some("Frank Herbert"), None, 0)
        .unwrap_err();
    assert!(matches!(err, LibraryError::BelowBorrowedCount { borrowed: 1, .. }));
    let untouched = library.find_book("Dune").unwrap().unwrap();
    assert_eq!(untouched.total_copies, 2);
    assert_eq!(untouched.available_copies, 1);
    assert_eq!(untouched.author, None);
    assert!(library.find_book("Dune Messiah").unwrap().is_none());

    let book = library
        .edit_book("Dune", "Dune", Some("Frank Herbert"), Some("Science"), 4)
        .unwrap();
    assert_eq!(book.total_copies, 4);
    assert_eq!(book.available_copies, 3);
    assert_eq!(book.category, "Science");
}

#[test]
fn rename_carries_loans_and_reviews() {
    let mut library = library();
    library.add_new_book("Dune", None, None, 1).unwrap();
    library.register_user("alice", "Alice Smith", None, None).unwrap();
    library.borrow_book("alice", "Dune").unwrap();
    library.add_book_review("alice", "Dune", 5, Some("Spice")).unwrap();

    library
        .edit_book("Dune", "Dune (1965)", None, None, 1)
        .unwrap();

    assert!(library.find_book("Dune").unwrap().is_none());
    assert_eq!(library.track_books().unwrap()[0].title, "Dune (1965)");
    assert_eq!(library.book_reviews("Dune (1965)").unwrap().len(), 1);
    library.return_book("alice", "Dune (1965)").unwrap();
}

#[test]
fn rename_onto_existing_title_is_refused() {
    let mut library = library();
    library.add_new_book("Dune", None, None, 1).unwrap();
    library.add_new_book("Emma", None, None, 1).unwrap();

    let err = library.edit_book("Dune", "Emma", None, None, 1).unwrap_err();
    assert!(matches!(err, LibraryError::DuplicateTitle(_)));
    assert!(library.find_book("Dune").unwrap().is_some());
}

#[test]
fn remove_book_waits_for_outstanding_copies() {
    let mut library = library();
    library.add_new_book("Dune", None, None, 1).unwrap();
    library.register_user("alice", "Alice Smith", None, None).unwrap();
    library.borrow_book("alice", "Dune").unwrap();

    let err = library.remove_book("Dune").unwrap_err();
    assert!(matches!(err, LibraryError::HasOutstandingLoans { count: 1, .. }));

    library.return_book("alice", "Dune").unwrap();
    library.add_book_review("alice", "Dune", 4, None).unwrap();
    library.remove_book("Dune").unwrap();

    assert!(library.find_book("Dune").unwrap().is_none());
    assert!(library.borrow_logs().unwrap().entries.is_empty());
    assert!(library.book_reviews("Dune").unwrap().is_empty());
    assert!(matches!(
        library.remove_book("Dune").unwrap_err(),
        LibraryError::BookNotFound(_)
    ));
}

#[test]
fn removed_user_keeps_loan_history() {
    let mut library = library();
    library.add_new_book("Dune", None, None, 1).unwrap();
    library.register_user("alice", "Alice Smith", None, None).unwrap();
    library.borrow_book("alice", "Dune").unwrap();

    assert!(matches!(
        library.remove_user("alice").unwrap_err(),
        LibraryError::HasOutstandingLoans { entity: "user", .. }
    ));

    library.return_book("alice", "Dune").unwrap();
    library.remove_user("alice").unwrap();

    assert!(library.find_user("alice").unwrap().is_none());
    let log = library.borrow_logs().unwrap();
    assert_eq!(log.entries.len(), 1);
    assert_eq!(log.entries[0].username, None);
    assert!(matches!(
        library.remove_user("alice").unwrap_err(),
        LibraryError::UserNotFound(_)
    ));
}

#[test]
fn registration_validates_and_rejects_duplicates() {
    let mut library = library();
    let user = library
        .register_user(" alice ", "Alice Smith", Some(""), None)
        .unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(user.class_name, None);
    assert_eq!(user.status, UserStatus::Active);

    assert!(matches!(
        library
            .register_user("alice", "Someone Else", None, None)
            .unwrap_err(),
        LibraryError::DuplicateUsername(_)
    ));
    assert_eq!(
        library.register_user("bob", " ", None, None).unwrap_err().kind(),
        ErrorKind::Validation
    );
}

#[test]
fn status_changes_require_existing_user() {
    let mut library = library();
    library.register_user("alice", "Alice Smith", None, None).unwrap();

    let user = library.set_user_status("alice", UserStatus::Inactive).unwrap();
    assert_eq!(user.status, UserStatus::Inactive);
    assert!(matches!(
        library
            .set_user_status("ghost", UserStatus::Active)
            .unwrap_err(),
        LibraryError::UserNotFound(_)
    ));
}

#[test]
fn search_matches_substrings_case_insensitively() {
    let mut library = library();
    library
        .add_new_book("Dune", Some("Frank Herbert"), Some("Fiction"), 1)
        .unwrap();
    library
        .add_new_book("100% Rust", Some("Ferris"), Some("Technology"), 1)
        .unwrap();
    library
        .register_user("alice", "Alice Smith", Some("10"), Some("B"))
        .unwrap();
    library.register_user("bob", "Bob Jones", None, None).unwrap();

    let found = library.search_books("herb").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "Dune");
    assert_eq!(library.search_books("TECH").unwrap().len(), 1);
    assert_eq!(library.search_books("0%").unwrap().len(), 1);
    assert_eq!(library.search_books("%").unwrap().len(), 1);

    let users = library.search_users("smith").unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user.username, "alice");
    assert_eq!(library.list_all_users().unwrap().len(), 2);
}

#[test]
fn available_books_skip_fully_borrowed_titles() {
    let mut library = library();
    library.add_new_book("Dune", None, None, 1).unwrap();
    library.add_new_book("Emma", None, None, 1).unwrap();
    library.register_user("alice", "Alice Smith", None, None).unwrap();
    library.borrow_book("alice", "Dune").unwrap();

    let titles: Vec<String> = library
        .available_books()
        .unwrap()
        .into_iter()
        .map(|book| book.title)
        .collect();
    assert_eq!(titles, vec!["Emma".to_string()]);
}

#[test]
fn reference_categories_are_seeded() {
    let library = library();
    let names: Vec<String> = library
        .list_categories()
        .unwrap()
        .into_iter()
        .map(|category| category.name)
        .collect();
    assert_eq!(names.len(), 8);
    assert!(names.contains(&"General".to_string()));
    assert!(names.contains(&"Fiction".to_string()));
}

#[test]
fn titles_and_usernames_match_exactly() {
    let mut library = library();
    library.add_new_book("Dune", None, None, 1).unwrap();
    library.register_user("alice", "Alice Smith", None, None).unwrap();

    assert!(library.find_book("dune").unwrap().is_none());
    assert!(matches!(
        library.borrow_book("alice", "dune").unwrap_err(),
        LibraryError::BookNotFound(_)
    ));
    assert!(matches!(
        library.borrow_book("Alice", "Dune").unwrap_err(),
        LibraryError::NotRegistered(_)
    ));

    // Differently cased titles are separate entries.
    library.add_new_book("DUNE", None, None, 1).unwrap();
    assert_eq!(library.list_books().unwrap().len(), 2);
    library.borrow_book("alice", " Dune ").unwrap();
}
