use super::*;
use crate::state::{Reason, test_helpers};

#[test]
fn env_parse_falls_back_on_garbage() {
    // Key is never set in the test environment.
    assert_eq!(env_parse("ROLLCALL_TEST_UNSET_KEY", 100_u64), 100);
}

#[cfg(feature = "live-db-tests")]
mod live_db {
    use super::*;
    use crate::services::record;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn flush_clears_dirty_flags_and_persists() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live-db-tests");
        let pool = crate::db::init_pool(&url).await.expect("database init");
        let state = crate::state::AppState::new(pool, None);

        let school_code = format!("test-{}", Uuid::new_v4());
        let (tx, _rx) = mpsc::channel(8);
        record::join_school(&state, &school_code, Uuid::new_v4(), tx)
            .await
            .unwrap();

        let saved = record::save_record(
            &state,
            &school_code,
            crate::state::test_helpers::dummy_record("Yassine", "Mr. Kaddour", Reason::Absent),
        )
        .await
        .unwrap();

        flush_all_dirty_for_tests(&state).await;

        {
            let schools = state.schools.read().await;
            assert!(schools.get(&school_code).unwrap().dirty.is_empty());
        }

        let listed = record::list_records(&state, &school_code).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);

        record::clear_records(&state, &school_code).await.unwrap();
        flush_all_dirty_for_tests(&state).await;
    }
}

#[tokio::test]
async fn flush_skips_schools_without_dirty_records() {
    // A clean school never reaches the database, so the lazy pool is safe.
    let state = test_helpers::test_app_state();
    test_helpers::seed_school_with_records(
        &state,
        "north-hill",
        vec![test_helpers::dummy_record("Yassine", "Mr. Kaddour", Reason::Absent)],
    )
    .await;

    flush_all_dirty_for_tests(&state).await;

    let schools = state.schools.read().await;
    assert_eq!(schools.get("north-hill").unwrap().records.len(), 1);
}
