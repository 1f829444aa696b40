//! Integration tests for check-in matching and suggestion ranking.

mod common;

use common::{create_booking, create_property, create_room, spawn_app, submit_check_in};
use serde_json::{json, Value};

#[tokio::test]
async fn identical_room_and_dates_produce_one_exact_match() {
    let app = spawn_app().await;
    let property_id = create_property(&app).await;
    let room_id = create_room(&app, property_id, "Room 1", None).await;
    let booking_id = create_booking(&app, room_id, "Maria Rossi", "2024-07-10", "2024-07-14").await;

    let check_in_id =
        submit_check_in(&app, room_id, "Maria", "Rossi", "2024-07-10", "2024-07-14").await;

    let suggestions = app
        .get_json(&format!("/check-ins/{}/suggestions", check_in_id))
        .await;
    let suggestions = suggestions.as_array().unwrap();

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["match_type"], "exact");
    assert_eq!(suggestions[0]["score"], 100);
    assert_eq!(suggestions[0]["booking_id"], booking_id.to_string());
    assert_eq!(suggestions[0]["match_reason"], "same room, exact dates");
}

#[tokio::test]
async fn abbreviated_name_falls_back_to_a_name_match() {
    let app = spawn_app().await;
    let property_id = create_property(&app).await;
    let room_1 = create_room(&app, property_id, "Room 1", None).await;
    let room_2 = create_room(&app, property_id, "Room 2", None).await;

    // No booking on the guest's selected room; the reservation sits on a
    // sibling room under an abbreviated name.
    let booking_id = create_booking(&app, room_2, "M. Rossi", "2024-07-10", "2024-07-14").await;

    let check_in_id =
        submit_check_in(&app, room_1, "Maria", "Rossi", "2024-07-10", "2024-07-14").await;

    let suggestions = app
        .get_json(&format!("/check-ins/{}/suggestions", check_in_id))
        .await;
    let suggestions = suggestions.as_array().unwrap();

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["match_type"], "name");
    assert_eq!(suggestions[0]["booking_id"], booking_id.to_string());
    let score = suggestions[0]["score"].as_u64().unwrap();
    assert!(score >= 40 && score < 100, "score was {}", score);
}

#[tokio::test]
async fn name_match_suppresses_property_fallbacks() {
    let app = spawn_app().await;
    let property_id = create_property(&app).await;
    let room_1 = create_room(&app, property_id, "Room 1", None).await;
    let room_2 = create_room(&app, property_id, "Room 2", None).await;
    let room_3 = create_room(&app, property_id, "Room 3", None).await;

    create_booking(&app, room_2, "John Smith", "2024-07-09", "2024-07-13").await;
    let named = create_booking(&app, room_3, "M. Rossi", "2024-07-10", "2024-07-14").await;

    let check_in_id =
        submit_check_in(&app, room_1, "Maria", "Rossi", "2024-07-10", "2024-07-14").await;

    let suggestions = app
        .get_json(&format!("/check-ins/{}/suggestions", check_in_id))
        .await;
    let suggestions = suggestions.as_array().unwrap();

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["match_type"], "name");
    assert_eq!(suggestions[0]["booking_id"], named.to_string());
}

#[tokio::test]
async fn property_fallback_appears_when_nothing_scores_higher() {
    let app = spawn_app().await;
    let property_id = create_property(&app).await;
    let room_1 = create_room(&app, property_id, "Room 1", None).await;
    let room_2 = create_room(&app, property_id, "Room 2", None).await;

    let other = create_booking(&app, room_2, "John Smith", "2024-07-09", "2024-07-13").await;

    let check_in_id =
        submit_check_in(&app, room_1, "Maria", "Rossi", "2024-07-10", "2024-07-14").await;

    let suggestions = app
        .get_json(&format!("/check-ins/{}/suggestions", check_in_id))
        .await;
    let suggestions = suggestions.as_array().unwrap();

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["match_type"], "property");
    assert_eq!(suggestions[0]["booking_id"], other.to_string());
}

#[tokio::test]
async fn no_candidates_means_an_empty_list_not_an_error() {
    let app = spawn_app().await;
    let property_id = create_property(&app).await;
    let room_id = create_room(&app, property_id, "Room 1", None).await;

    let check_in_id =
        submit_check_in(&app, room_id, "Maria", "Rossi", "2024-07-10", "2024-07-14").await;

    let response = app
        .get(&format!("/check-ins/{}/suggestions", check_in_id))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let suggestions: Value = response.json().await.unwrap();
    assert_eq!(suggestions.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn suggestions_are_disallowed_after_approval() {
    let app = spawn_app().await;
    let property_id = create_property(&app).await;
    let room_id = create_room(&app, property_id, "Room 1", None).await;
    let booking_id = create_booking(&app, room_id, "Maria Rossi", "2024-07-10", "2024-07-14").await;

    let check_in_id =
        submit_check_in(&app, room_id, "Maria", "Rossi", "2024-07-10", "2024-07-14").await;

    let response = app
        .post(
            &format!("/check-ins/{}/approve", check_in_id),
            &json!({"booking_id": booking_id}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .get(&format!("/check-ins/{}/suggestions", check_in_id))
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn suggestions_for_unknown_check_in_are_not_found() {
    let app = spawn_app().await;
    let response = app
        .get(&format!("/check-ins/{}/suggestions", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(response.status().as_u16(), 404);
}
